//! offsync: an offline-first refresh cache engine.
//!
//! Keeps a local SQLite mirror of remote resources reasonably fresh
//! under intermittent connectivity. Consumers read cache state through
//! the tri-state [`Resource`] stream and never block on network I/O;
//! the [`sync::SyncManager`] refreshes categories on a schedule, on
//! demand, and when connectivity returns, coalescing concurrent
//! requests and backing off after failures.

pub mod config;
pub mod connectivity;
pub mod model;
pub mod remote;
pub mod resource;
pub mod store;
pub mod sync;

pub use connectivity::{ConnectivityEvent, ConnectivityMonitor};
pub use resource::{Resource, ResourceStatus};
pub use store::{Checkpoint, LocalStore, Persistable, SqliteStore};
pub use sync::{BackoffPolicy, CategoryHandle, CategorySpec, SyncManager, SyncPhase, Syncable};
