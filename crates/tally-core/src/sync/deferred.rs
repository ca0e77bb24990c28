//! Deferred background sync: named reconciliation requests retried with
//! exponential backoff.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{CycleOutcome, SyncEngine};
use crate::remote::RemoteEntries;

/// Attempts per registration before it is dropped.
pub const MAX_SYNC_ATTEMPTS: u32 = 3;

/// Something that can run a reconciliation cycle.
pub trait Reconcile: Send + Sync {
    /// True when the request is satisfied: the cycle finished, or another
    /// running cycle covers it.
    fn reconcile(&self) -> impl Future<Output = bool> + Send;
}

impl<R: RemoteEntries> Reconcile for SyncEngine<R> {
    async fn reconcile(&self) -> bool {
        match self.run_cycle().await {
            Ok(CycleOutcome::Completed(_) | CycleOutcome::AlreadyRunning) => true,
            Ok(CycleOutcome::Offline) => false,
            Err(error) => {
                debug!(%error, "Deferred reconciliation attempt failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    attempts: u32,
    due: Instant,
}

#[derive(Debug, Default)]
pub struct DeferredSync {
    pending: Mutex<BTreeMap<String, Registration>>,
    wake: Notify,
}

impl DeferredSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `tag` for an immediate attempt. Re-registering a pending tag
    /// resets its attempt counter.
    pub fn register(&self, tag: &str) {
        self.lock().insert(
            tag.to_string(),
            Registration {
                attempts: 0,
                due: Instant::now(),
            },
        );
        debug!(tag, "Registered deferred sync");
        self.wake.notify_one();
    }

    /// Register `tag` after an attempt made elsewhere already failed. That
    /// attempt counts, so the first retry waits one backoff step.
    pub fn register_retry(&self, tag: &str) {
        self.lock().insert(
            tag.to_string(),
            Registration {
                attempts: 1,
                due: Instant::now() + backoff(1),
            },
        );
        debug!(tag, "Registered deferred sync retry");
        self.wake.notify_one();
    }

    pub fn is_pending(&self, tag: &str) -> bool {
        self.lock().contains_key(tag)
    }

    pub fn pending_tags(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Registration>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_due(&self) -> Option<Instant> {
        self.lock().values().map(|registration| registration.due).min()
    }

    /// Run every registration that is due. Returns how many attempts ran.
    pub async fn run_due<C: Reconcile>(&self, reconciler: &C) -> usize {
        let now = Instant::now();
        let due = self
            .lock()
            .iter()
            .filter(|(_, registration)| registration.due <= now)
            .map(|(tag, _)| tag.clone())
            .collect::<Vec<_>>();

        for tag in &due {
            let satisfied = reconciler.reconcile().await;
            let mut pending = self.lock();
            if satisfied {
                pending.remove(tag);
                debug!(tag = tag.as_str(), "Deferred sync satisfied");
                continue;
            }
            let Some(registration) = pending.get_mut(tag) else {
                continue;
            };
            registration.attempts += 1;
            if registration.attempts >= MAX_SYNC_ATTEMPTS {
                pending.remove(tag);
                warn!(
                    tag = tag.as_str(),
                    attempts = MAX_SYNC_ATTEMPTS,
                    "Deferred sync gave up"
                );
            } else {
                let delay = backoff(registration.attempts);
                registration.due = Instant::now() + delay;
                info!(
                    tag = tag.as_str(),
                    attempt = registration.attempts,
                    delay_secs = delay.as_secs(),
                    "Deferred sync will retry"
                );
            }
        }
        due.len()
    }

    /// Serve registrations until `shutdown` flips to true.
    pub async fn run<C: Reconcile>(&self, reconciler: &C, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.run_due(reconciler).await;

            let next = self.next_due();
            let sleep = async {
                match next {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                () = sleep => {}
                () = self.wake.notified() => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }
}

/// `2^attempt` seconds.
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(2_u64.saturating_pow(attempt))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Default)]
    struct Scripted {
        calls: AtomicUsize,
        succeed: AtomicBool,
    }

    impl Reconcile for Scripted {
        async fn reconcile(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.succeed.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn backoff_doubles() {
        assert_eq!(backoff(1), Duration::from_secs(2));
        assert_eq!(backoff(2), Duration::from_secs(4));
        assert_eq!(backoff(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn failing_registration_retries_with_backoff_then_drops() {
        let deferred = Arc::new(DeferredSync::new());
        let reconciler = Arc::new(Scripted::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = {
            let deferred = Arc::clone(&deferred);
            let reconciler = Arc::clone(&reconciler);
            tokio::spawn(async move { deferred.run(reconciler.as_ref(), shutdown_rx).await })
        };

        deferred.register("sync-entries");
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 3);
        assert!(!deferred.is_pending("sync-entries"));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), MAX_SYNC_ATTEMPTS as usize);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn successful_attempt_clears_registration() {
        let deferred = DeferredSync::new();
        let reconciler = Scripted::default();
        reconciler.succeed.store(true, Ordering::SeqCst);

        deferred.register("sync-entries");
        assert_eq!(deferred.run_due(&reconciler).await, 1);
        assert!(deferred.pending_tags().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_registration_waits_and_counts_the_failed_attempt() {
        let deferred = DeferredSync::new();
        let reconciler = Scripted::default();

        deferred.register_retry("sync-entries");
        assert_eq!(deferred.run_due(&reconciler).await, 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(deferred.run_due(&reconciler).await, 1);
        assert!(deferred.is_pending("sync-entries"));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(deferred.run_due(&reconciler).await, 1);
        assert!(!deferred.is_pending("sync-entries"));
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn re_registering_resets_attempts() {
        let deferred = DeferredSync::new();
        let reconciler = Scripted::default();

        deferred.register("sync-entries");
        deferred.run_due(&reconciler).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        deferred.run_due(&reconciler).await;

        deferred.register("sync-entries");
        deferred.run_due(&reconciler).await;
        tokio::time::advance(Duration::from_secs(2)).await;
        deferred.run_due(&reconciler).await;

        // Four failures in total, but never three in a row.
        assert_eq!(reconciler.calls.load(Ordering::SeqCst), 4);
        assert!(deferred.is_pending("sync-entries"));
    }
}
