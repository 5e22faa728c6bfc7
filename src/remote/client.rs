//! HTTP adapter for the remote data source.

use std::time::Duration;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

use super::api_types::{ApiBookmark, ApiListResponse, ApiUser};
use super::RemoteError;
use crate::model::{Bookmark, User};

/// Remote adapter over the configured base URL.
///
/// Categories register boxed fetcher closures with the sync manager, so
/// the engine never depends on this type and tests substitute fakes
/// freely.
#[derive(Clone)]
pub struct HttpRemote {
  client: reqwest::Client,
  base: Url,
}

impl HttpRemote {
  pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
    let base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid remote url {}: {}", base_url, e))?;
    let client = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client, base })
  }

  pub async fn fetch_users(
    &self,
    since: Option<DateTime<Utc>>,
  ) -> std::result::Result<Vec<User>, RemoteError> {
    let response: ApiListResponse<ApiUser> = self.get_list("api/users", since).await?;
    Ok(response.items.into_iter().map(ApiUser::into_entity).collect())
  }

  pub async fn fetch_bookmarks(
    &self,
    since: Option<DateTime<Utc>>,
  ) -> std::result::Result<Vec<Bookmark>, RemoteError> {
    let response: ApiListResponse<ApiBookmark> = self.get_list("api/bookmarks", since).await?;
    Ok(
      response
        .items
        .into_iter()
        .map(ApiBookmark::into_entity)
        .collect(),
    )
  }

  /// Reachability probe for the connectivity monitor: any response from
  /// the remote host counts as online, a transport failure as offline.
  pub async fn probe(&self) -> bool {
    self.client.head(self.base.clone()).send().await.is_ok()
  }

  /// Stable hash of the query shape, persisted with the checkpoint so a
  /// configuration change invalidates cached watermarks.
  pub fn query_fingerprint(&self, path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.base.as_str().as_bytes());
    hasher.update(path.as_bytes());
    hex::encode(hasher.finalize())
  }

  async fn get_list<T: DeserializeOwned>(
    &self,
    path: &str,
    since: Option<DateTime<Utc>>,
  ) -> std::result::Result<ApiListResponse<T>, RemoteError> {
    let url = self
      .base
      .join(path)
      .map_err(|e| RemoteError::Network(format!("invalid request url: {e}")))?;
    let mut request = self.client.get(url);
    if let Some(since) = since {
      request = request.query(&[("updated_since", since.to_rfc3339())]);
    }

    debug!(path, incremental = since.is_some(), "remote fetch");
    let response = request.send().await.map_err(map_transport_error)?;
    let status = response.status().as_u16();
    if status >= 400 {
      return Err(RemoteError::Server(status));
    }

    response
      .json::<ApiListResponse<T>>()
      .await
      .map_err(map_transport_error)
  }
}

fn map_transport_error(error: reqwest::Error) -> RemoteError {
  if error.is_timeout() {
    RemoteError::Timeout
  } else {
    RemoteError::Network(error.to_string())
  }
}
