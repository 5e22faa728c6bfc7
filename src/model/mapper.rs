//! Pure conversions between domain entities and persisted records.
//!
//! The mapper performs no validation and no business logic; it is a
//! field-for-field transcription in both directions. The round-trip law
//! — `from_record(to_record(e)) == e` for every entity, and symmetrically
//! for every record reachable from storage — is what lets the rest of the
//! engine treat the store as a faithful mirror of the domain. A field
//! that exists on one side only is a schema bug, caught here, not a
//! runtime condition to paper over.

use crate::model::records::{BookmarkRecord, UserRecord};
use crate::model::types::{Bookmark, User};
use crate::sync::Syncable;

pub fn user_to_record(user: &User) -> UserRecord {
  UserRecord {
    id: user.id.clone(),
    login: user.login.clone(),
    display_name: user.display_name.clone(),
    avatar_url: user.avatar_url.clone(),
    updated_at: user.updated_at,
  }
}

pub fn user_from_record(record: &UserRecord) -> User {
  User {
    id: record.id.clone(),
    login: record.login.clone(),
    display_name: record.display_name.clone(),
    avatar_url: record.avatar_url.clone(),
    updated_at: record.updated_at,
  }
}

pub fn bookmark_to_record(bookmark: &Bookmark) -> BookmarkRecord {
  BookmarkRecord {
    id: bookmark.id.clone(),
    title: bookmark.title.clone(),
    url: bookmark.url.clone(),
    owner_id: bookmark.owner_id.clone(),
    tags: bookmark.tags.clone(),
    updated_at: bookmark.updated_at,
  }
}

pub fn bookmark_from_record(record: &BookmarkRecord) -> Bookmark {
  Bookmark {
    id: record.id.clone(),
    title: record.title.clone(),
    url: record.url.clone(),
    owner_id: record.owner_id.clone(),
    tags: record.tags.clone(),
    updated_at: record.updated_at,
  }
}

impl Syncable for User {
  type Record = UserRecord;

  fn to_record(&self) -> UserRecord {
    user_to_record(self)
  }

  fn from_record(record: &UserRecord) -> Self {
    user_from_record(record)
  }
}

impl Syncable for Bookmark {
  type Record = BookmarkRecord;

  fn to_record(&self) -> BookmarkRecord {
    bookmark_to_record(self)
  }

  fn from_record(record: &BookmarkRecord) -> Self {
    bookmark_from_record(record)
  }
}
