//! In-memory presentation view.

use std::sync::{Arc, PoisonError, RwLock};

use crate::models::{LocalId, LocalRecord};

/// Visible entries ordered newest first. Clones share the same view.
#[derive(Debug, Clone, Default)]
pub struct EntryView {
    entries: Arc<RwLock<Vec<LocalRecord>>>,
}

impl EntryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<LocalRecord> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the view; tombstones are filtered and order is enforced.
    pub fn replace(&self, mut entries: Vec<LocalRecord>) {
        entries.retain(LocalRecord::is_visible);
        sort_newest_first(&mut entries);
        *self.entries.write().unwrap_or_else(PoisonError::into_inner) = entries;
    }

    /// Insert or refresh a single entry.
    pub fn upsert(&self, record: LocalRecord) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.retain(|existing| existing.local_id != record.local_id);
        if record.is_visible() {
            entries.push(record);
            sort_newest_first(&mut entries);
        }
    }

    pub fn remove(&self, id: LocalId) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|existing| existing.local_id != id);
    }
}

fn sort_newest_first(entries: &mut [LocalRecord]) {
    entries.sort_by(|a, b| {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| b.local_id.cmp(&a.local_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntryDraft;
    use chrono::{Duration, Utc};

    fn record(id: i64, name: &str, age_secs: i64) -> LocalRecord {
        let draft =
            EntryDraft::with_timestamp(name, None, Utc::now() - Duration::seconds(age_secs))
                .unwrap();
        LocalRecord::from_draft(LocalId::new(id), draft)
    }

    #[test]
    fn replace_orders_and_hides_tombstones() {
        let view = EntryView::new();
        let mut gone = record(3, "gone", 0);
        gone.mark_deleted(Utc::now());

        view.replace(vec![record(1, "old", 30), record(2, "new", 10), gone]);

        let names = view
            .snapshot()
            .into_iter()
            .map(|entry| entry.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["new", "old"]);
    }

    #[test]
    fn upsert_and_remove() {
        let view = EntryView::new();
        view.upsert(record(1, "first", 10));
        view.upsert(record(2, "second", 0));
        assert_eq!(view.snapshot()[0].name, "second");

        view.remove(LocalId::new(2));
        assert_eq!(view.len(), 1);

        let mut tombstone = record(1, "first", 10);
        tombstone.mark_deleted(Utc::now());
        view.upsert(tombstone);
        assert!(view.is_empty());
    }
}
