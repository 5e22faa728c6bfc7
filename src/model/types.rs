//! Domain entities synchronized from the remote service.
//!
//! Entities reference each other by identifier, never by embedded object,
//! so the cache stays acyclic and individual rows can be refreshed
//! independently. They are mutated only by mapping-in from the remote
//! source.

use chrono::{DateTime, Utc};

/// A workspace member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
  pub id: String,
  pub login: String,
  pub display_name: String,
  pub avatar_url: Option<String>,
  /// Remote modification stamp, drives incremental fetching.
  pub updated_at: DateTime<Utc>,
}

/// A saved link belonging to a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bookmark {
  pub id: String,
  pub title: String,
  pub url: String,
  /// Owning [`User`], referenced by id.
  pub owner_id: String,
  pub tags: Vec<String>,
  /// Remote modification stamp, drives incremental fetching.
  pub updated_at: DateTime<Utc>,
}
