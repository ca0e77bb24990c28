//! Local durable store for Tally

mod connection;
mod migrations;
mod repository;

pub use connection::{Database, STORE_NAME, STORE_VERSION};
pub use repository::{EntryRepository, LibSqlEntryRepository};
