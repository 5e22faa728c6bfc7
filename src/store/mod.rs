//! Local store: the durable, key-addressed mirror of remote entities.
//!
//! The store is the system of record for what the client currently
//! believes. It has a single writer — the sync manager's write-through
//! path — and any number of readers. Batch writes are atomic: a refresh
//! is either fully visible or not at all.

mod sqlite;

pub use sqlite::SqliteStore;

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{de::DeserializeOwned, Serialize};

/// Trait for record types the store can persist.
///
/// One record type per category; the category name keys both the entity
/// rows and the per-category checkpoint.
pub trait Persistable: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Stable opaque identifier for this record.
  fn record_id(&self) -> String;

  /// Remote modification stamp, if the record tracks one.
  fn updated_at(&self) -> Option<DateTime<Utc>>;

  /// Category name for storage organization (e.g., "users", "bookmarks").
  fn category() -> &'static str;
}

/// Persisted per-category refresh bookkeeping, kept outside the entity
/// table. This is the only sync state that survives a restart; phase and
/// failure counts are process-local.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
  /// Completion time of the last successful refresh cycle.
  pub last_synced_at: DateTime<Utc>,
  /// Highest remote `updated_at` seen so far; passed back to the remote
  /// as the incremental-since parameter.
  pub watermark: Option<DateTime<Utc>>,
  /// Hash of the remote query shape; a mismatch forces a full refetch.
  pub fingerprint: Option<String>,
  /// Row count after the last successful refresh.
  pub result_count: usize,
}

/// Contract the sync engine consumes for persistence.
pub trait LocalStore: Send + Sync {
  /// Insert or replace a single record.
  fn upsert<R: Persistable>(&self, record: &R) -> Result<()>;

  /// Insert or replace a batch in one transaction. The batch either
  /// fully applies or is fully rejected; readers never observe a
  /// half-written refresh.
  fn upsert_all<R: Persistable>(&self, records: &[R]) -> Result<()>;

  /// Look up a single record by id within its category.
  fn get_by_id<R: Persistable>(&self, id: &str) -> Result<Option<R>>;

  /// All records of a category, newest remote stamp first, id as
  /// tie-break.
  fn get_all<R: Persistable>(&self) -> Result<Vec<R>>;

  /// Delete category rows whose local refresh stamp predates
  /// `older_than`. Used after a full refresh to drop rows that no longer
  /// exist remotely. Returns the number of rows removed.
  fn delete_stale<R: Persistable>(&self, older_than: DateTime<Utc>) -> Result<usize>;

  /// Read the persisted checkpoint for a category, if any.
  fn read_checkpoint(&self, category: &str) -> Result<Option<Checkpoint>>;

  /// Insert or replace the checkpoint for a category.
  fn write_checkpoint(&self, category: &str, checkpoint: &Checkpoint) -> Result<()>;
}
