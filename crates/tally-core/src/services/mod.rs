//! Services shared by every client: the store handle and the entry service
//! the presentation layer talks to.

mod entries;
mod store;

pub use entries::{EntryService, ImportReport};
pub use store::{Deletion, EntryStore, PushAcceptance};
