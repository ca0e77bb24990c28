//! Synchronization engine and its triggers.
//!
//! A reconciliation cycle runs three phases in strict order: propagate local
//! deletions, push unsynced entries, then pull and merge remote entries. The
//! in-memory view is reloaded afterwards. Delete beats recreate: an identity
//! tombstoned locally is never resurrected by a pull.

mod deferred;
mod engine;
mod guard;
mod report;
mod throttle;
mod trigger;
mod view;


pub use deferred::{DeferredSync, Reconcile, MAX_SYNC_ATTEMPTS};
pub use engine::{CycleOutcome, SyncEngine, SyncSettings};
pub use guard::{CycleGuard, CycleState, CycleToken};
pub use report::SyncReport;
pub use throttle::ReconnectThrottle;
pub use trigger::{ReconciliationTrigger, SYNC_TAG};
pub use view::EntryView;
