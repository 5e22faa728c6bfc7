//! Persisted record shapes for the local store.
//!
//! Records are kept separate from domain types so the on-disk schema can
//! stay stable while the domain evolves. Every record corresponds
//! field-for-field to its entity; the mapper in [`super::mapper`] is the
//! only module allowed to rely on that correspondence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::Persistable;

/// On-disk shape of a [`crate::model::User`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
  pub id: String,
  pub login: String,
  pub display_name: String,
  pub avatar_url: Option<String>,
  pub updated_at: DateTime<Utc>,
}

impl Persistable for UserRecord {
  fn record_id(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    Some(self.updated_at)
  }

  fn category() -> &'static str {
    "users"
  }
}

/// On-disk shape of a [`crate::model::Bookmark`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookmarkRecord {
  pub id: String,
  pub title: String,
  pub url: String,
  pub owner_id: String,
  pub tags: Vec<String>,
  pub updated_at: DateTime<Utc>,
}

impl Persistable for BookmarkRecord {
  fn record_id(&self) -> String {
    self.id.clone()
  }

  fn updated_at(&self) -> Option<DateTime<Utc>> {
    Some(self.updated_at)
  }

  fn category() -> &'static str {
    "bookmarks"
  }
}
