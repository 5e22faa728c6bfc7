//! Serde types matching the remote API's JSON responses.
//!
//! Wire shapes are kept separate from domain types so deserialization
//! stays clean while the domain model carries only what the engine
//! needs.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::{Bookmark, User};

/// List envelope shared by the collection endpoints.
#[derive(Debug, Deserialize)]
pub struct ApiListResponse<T> {
  #[serde(default = "Vec::new")]
  pub items: Vec<T>,
}

#[derive(Debug, Deserialize)]
pub struct ApiUser {
  pub id: String,
  pub login: String,
  #[serde(rename = "displayName")]
  pub display_name: String,
  #[serde(rename = "avatarUrl")]
  pub avatar_url: Option<String>,
  #[serde(rename = "updatedAt")]
  pub updated_at: DateTime<Utc>,
}

impl ApiUser {
  pub fn into_entity(self) -> User {
    User {
      id: self.id,
      login: self.login,
      display_name: self.display_name,
      avatar_url: self.avatar_url,
      updated_at: self.updated_at,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct ApiBookmark {
  pub id: String,
  pub title: String,
  pub url: String,
  #[serde(rename = "ownerId")]
  pub owner_id: String,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(rename = "updatedAt")]
  pub updated_at: DateTime<Utc>,
}

impl ApiBookmark {
  pub fn into_entity(self) -> Bookmark {
    Bookmark {
      id: self.id,
      title: self.title,
      url: self.url,
      owner_id: self.owner_id,
      tags: self.tags,
      updated_at: self.updated_at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_user_response_deserializes() {
    let body = r#"{
      "items": [
        {
          "id": "u-1",
          "login": "mira",
          "displayName": "Mira Voss",
          "avatarUrl": null,
          "updatedAt": "2024-03-11T09:30:00Z"
        }
      ]
    }"#;

    let response: ApiListResponse<ApiUser> = serde_json::from_str(body).unwrap();
    assert_eq!(response.items.len(), 1);
    let user = response.items.into_iter().next().unwrap().into_entity();
    assert_eq!(user.id, "u-1");
    assert_eq!(user.display_name, "Mira Voss");
    assert_eq!(user.avatar_url, None);
  }

  #[test]
  fn test_bookmark_tags_default_to_empty() {
    let body = r#"{
      "id": "b-1",
      "title": "Reading",
      "url": "https://example.test/reading",
      "ownerId": "u-1",
      "updatedAt": "2024-03-12T14:05:07Z"
    }"#;

    let bookmark = serde_json::from_str::<ApiBookmark>(body).unwrap().into_entity();
    assert_eq!(bookmark.owner_id, "u-1");
    assert!(bookmark.tags.is_empty());
  }

  #[test]
  fn test_missing_items_field_is_an_empty_list() {
    let response: ApiListResponse<ApiUser> = serde_json::from_str("{}").unwrap();
    assert!(response.items.is_empty());
  }
}
