//! The sync engine: per-category state, scheduling, and refresh cycles.

mod manager;
mod scheduler;
mod state;

pub use manager::{CategoryHandle, CategorySpec, SyncManager};
pub use scheduler::PeriodicScheduler;
pub use state::{BackoffPolicy, SyncPhase, SyncState};

use crate::store::Persistable;

/// Trait for domain types that can sync through the engine.
///
/// The entity side of the mapping contract: an associated persisted
/// record shape plus the two conversion directions. Implementations
/// delegate to the free functions in [`crate::model::mapper`] so the
/// round-trip law stays in one place.
pub trait Syncable: Clone + PartialEq + Send + Sync + 'static {
  /// The persisted shape of this entity.
  type Record: Persistable + 'static;

  fn to_record(&self) -> Self::Record;

  fn from_record(record: &Self::Record) -> Self;
}
