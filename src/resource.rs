//! Tri-state wrapper handed to consumers of the cache.
//!
//! A `Resource<T>` bundles data with how much to trust it: a successful
//! refresh, a failed refresh still carrying the last-known-good value, or
//! an in-flight load. It is the single channel through which the sync
//! manager and the cache-read paths report state — there is no separate
//! error channel.

/// Coarse status of a [`Resource`], independent of its payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
  /// Fresh data from a completed refresh.
  Success,
  /// The last refresh failed; any carried data is stale.
  Error,
  /// A refresh is in flight; any carried data is stale.
  Loading,
}

/// Data plus confidence, produced once per query or refresh outcome.
///
/// `Success` always carries data. `Error` and `Loading` may carry the
/// last-known-good value so consumers can keep rendering the cache while
/// a refresh fails or runs. Only `Error` carries a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource<T> {
  /// Fresh data from a completed refresh.
  Success(T),
  /// Refresh failed; `data` is the stale cache if one exists.
  Error {
    message: String,
    data: Option<T>,
  },
  /// Refresh in flight; `data` is the stale cache if one exists.
  Loading {
    data: Option<T>,
  },
}

impl<T> Resource<T> {
  /// Fresh data from a completed refresh.
  pub fn success(data: T) -> Self {
    Resource::Success(data)
  }

  /// A failure with no cached data to fall back on.
  pub fn error(message: impl Into<String>) -> Self {
    Resource::Error {
      message: message.into(),
      data: None,
    }
  }

  /// A failure that keeps serving the last-known-good value.
  pub fn error_with(message: impl Into<String>, stale: T) -> Self {
    Resource::Error {
      message: message.into(),
      data: Some(stale),
    }
  }

  /// A refresh in flight with nothing cached yet.
  pub fn loading() -> Self {
    Resource::Loading { data: None }
  }

  /// A refresh in flight over an existing cached value.
  pub fn loading_with(stale: T) -> Self {
    Resource::Loading { data: Some(stale) }
  }

  /// The status tag without the payload.
  pub fn status(&self) -> ResourceStatus {
    match self {
      Resource::Success(_) => ResourceStatus::Success,
      Resource::Error { .. } => ResourceStatus::Error,
      Resource::Loading { .. } => ResourceStatus::Loading,
    }
  }

  pub fn is_success(&self) -> bool {
    matches!(self, Resource::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, Resource::Error { .. })
  }

  pub fn is_loading(&self) -> bool {
    matches!(self, Resource::Loading { .. })
  }

  /// The carried data, fresh or stale.
  pub fn data(&self) -> Option<&T> {
    match self {
      Resource::Success(data) => Some(data),
      Resource::Error { data, .. } => data.as_ref(),
      Resource::Loading { data } => data.as_ref(),
    }
  }

  /// The failure message, present only for `Error`.
  pub fn message(&self) -> Option<&str> {
    match self {
      Resource::Error { message, .. } => Some(message),
      _ => None,
    }
  }

  /// Consume the resource, keeping only the carried data.
  pub fn into_data(self) -> Option<T> {
    match self {
      Resource::Success(data) => Some(data),
      Resource::Error { data, .. } => data,
      Resource::Loading { data } => data,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_success_always_carries_data() {
    let r = Resource::success(vec![1, 2, 3]);
    assert!(r.is_success());
    assert_eq!(r.status(), ResourceStatus::Success);
    assert_eq!(r.data(), Some(&vec![1, 2, 3]));
    assert_eq!(r.message(), None);
  }

  #[test]
  fn test_error_without_stale_data() {
    let r: Resource<Vec<i32>> = Resource::error("fetch failed");
    assert!(r.is_error());
    assert_eq!(r.data(), None);
    assert_eq!(r.message(), Some("fetch failed"));
  }

  #[test]
  fn test_error_keeps_last_known_good() {
    let r = Resource::error_with("server error (503)", vec![1, 2]);
    assert!(r.is_error());
    assert_eq!(r.data(), Some(&vec![1, 2]));
    assert_eq!(r.message(), Some("server error (503)"));
  }

  #[test]
  fn test_loading_with_and_without_stale_data() {
    let empty: Resource<Vec<i32>> = Resource::loading();
    assert!(empty.is_loading());
    assert_eq!(empty.data(), None);
    assert_eq!(empty.message(), None);

    let warm = Resource::loading_with(vec![7]);
    assert!(warm.is_loading());
    assert_eq!(warm.data(), Some(&vec![7]));
    assert_eq!(warm.message(), None);
  }

  #[test]
  fn test_into_data() {
    assert_eq!(Resource::success(5).into_data(), Some(5));
    assert_eq!(Resource::<i32>::error("nope").into_data(), None);
    assert_eq!(Resource::loading_with(9).into_data(), Some(9));
  }
}
