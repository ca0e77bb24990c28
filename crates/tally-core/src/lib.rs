//! tally-core - Core library for Tally
//!
//! This crate contains the offline-first synchronization engine, the local
//! durable store it reconciles, the remote service client, and the resource
//! cache layer used by the shell server. The CLI and shell binaries are thin
//! collaborators over these modules.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod network;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{EntryDraft, Language, LocalId, LocalRecord, Location, RemoteId, RemoteRecord};
pub use state::SyncState;
