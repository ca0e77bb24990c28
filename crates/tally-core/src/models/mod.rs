//! Data models for Tally

mod entry;
mod language;
mod remote_record;

pub use entry::{EntryDraft, LocalId, LocalRecord, Location, RemoteId};
pub use language::Language;
pub use remote_record::{NewRemoteRecord, RemoteRecord};
