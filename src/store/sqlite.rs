//! SQLite implementation of the local store.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{Checkpoint, LocalStore, Persistable};

/// Schema for the entity mirror and the per-category checkpoints.
const SCHEMA: &str = r#"
-- Entity mirror (stores serialized JSON record payloads)
CREATE TABLE IF NOT EXISTS entities (
    category TEXT NOT NULL,
    id TEXT NOT NULL,
    payload BLOB NOT NULL,
    updated_at TEXT,
    refreshed_at TEXT NOT NULL,
    PRIMARY KEY (category, id)
);

CREATE INDEX IF NOT EXISTS idx_entities_updated
    ON entities(category, updated_at);

-- Per-category refresh checkpoints, kept outside the entity rows
CREATE TABLE IF NOT EXISTS sync_meta (
    category TEXT PRIMARY KEY,
    last_synced_at TEXT NOT NULL,
    watermark TEXT,
    fingerprint TEXT,
    result_count INTEGER NOT NULL
);
"#;

/// Durable store over a single SQLite connection.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open (or create) the store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store database at {}: {}", path.display(), e))?;
    Self::from_connection(conn)
  }

  /// Open the store at the default on-disk location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// In-memory store, used by tests.
  pub fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::from_connection(conn)
  }

  /// Default database path: `<data_dir>/offsync/cache.db`.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("offsync").join("cache.db"))
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(())
  }
}

impl LocalStore for SqliteStore {
  fn upsert<R: Persistable>(&self, record: &R) -> Result<()> {
    self.upsert_all(std::slice::from_ref(record))
  }

  fn upsert_all<R: Persistable>(&self, records: &[R]) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    // Dropping the transaction on an early return rolls the whole batch
    // back; readers never see a half-written refresh.
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    let refreshed_at = Utc::now().to_rfc3339();

    for record in records {
      let payload =
        serde_json::to_vec(record).map_err(|e| eyre!("Failed to serialize record: {}", e))?;
      tx.execute(
        "INSERT OR REPLACE INTO entities (category, id, payload, updated_at, refreshed_at)
         VALUES (?, ?, ?, ?, ?)",
        params![
          R::category(),
          record.record_id(),
          payload,
          record.updated_at().map(|t| t.to_rfc3339()),
          refreshed_at
        ],
      )
      .map_err(|e| eyre!("Failed to store record: {}", e))?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit batch: {}", e))?;
    Ok(())
  }

  fn get_by_id<R: Persistable>(&self, id: &str) -> Result<Option<R>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT payload FROM entities WHERE category = ? AND id = ?")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let payload: Option<Vec<u8>> = stmt
      .query_row(params![R::category(), id], |row| row.get(0))
      .ok();

    match payload {
      // A payload that no longer decodes is a schema bug; surface it
      // instead of treating the row as a miss.
      Some(data) => {
        let record = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to decode record payload for id {}: {}", id, e))?;
        Ok(Some(record))
      }
      None => Ok(None),
    }
  }

  fn get_all<R: Persistable>(&self) -> Result<Vec<R>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT payload FROM entities WHERE category = ?
         ORDER BY updated_at DESC, id ASC",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let payloads: Vec<Vec<u8>> = stmt
      .query_map(params![R::category()], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query records: {}", e))?
      .collect::<std::result::Result<_, _>>()
      .map_err(|e| eyre!("Failed to read record row: {}", e))?;

    payloads
      .iter()
      .map(|data| {
        serde_json::from_slice(data).map_err(|e| eyre!("Failed to decode record payload: {}", e))
      })
      .collect()
  }

  fn delete_stale<R: Persistable>(&self, older_than: DateTime<Utc>) -> Result<usize> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let removed = conn
      .execute(
        "DELETE FROM entities WHERE category = ? AND refreshed_at < ?",
        params![R::category(), older_than.to_rfc3339()],
      )
      .map_err(|e| eyre!("Failed to delete stale records: {}", e))?;

    Ok(removed)
  }

  fn read_checkpoint(&self, category: &str) -> Result<Option<Checkpoint>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare(
        "SELECT last_synced_at, watermark, fingerprint, result_count
         FROM sync_meta WHERE category = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(String, Option<String>, Option<String>, usize)> = stmt
      .query_row(params![category], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
      })
      .ok();

    match row {
      Some((last_synced_at, watermark, fingerprint, result_count)) => Ok(Some(Checkpoint {
        last_synced_at: parse_datetime(&last_synced_at)?,
        watermark: watermark.as_deref().map(parse_datetime).transpose()?,
        fingerprint,
        result_count,
      })),
      None => Ok(None),
    }
  }

  fn write_checkpoint(&self, category: &str, checkpoint: &Checkpoint) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO sync_meta
           (category, last_synced_at, watermark, fingerprint, result_count)
         VALUES (?, ?, ?, ?, ?)",
        params![
          category,
          checkpoint.last_synced_at.to_rfc3339(),
          checkpoint.watermark.map(|t| t.to_rfc3339()),
          checkpoint.fingerprint,
          checkpoint.result_count
        ],
      )
      .map_err(|e| eyre!("Failed to write checkpoint: {}", e))?;

    Ok(())
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
