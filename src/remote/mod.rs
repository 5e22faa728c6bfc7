//! Remote data source: the error taxonomy and the HTTP adapter.
//!
//! The engine itself only ever sees boxed fetcher closures returning
//! `Result<Vec<E>, RemoteError>`; [`HttpRemote`] is the production
//! implementation behind those closures.

mod api_types;
mod client;

pub use client::HttpRemote;

use thiserror::Error;

/// Failure kinds of a remote fetch.
///
/// All kinds are treated identically for backoff purposes; the kind is
/// preserved in the message surfaced through the resource stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
  #[error("network error: {0}")]
  Network(String),
  #[error("server error (status {0})")]
  Server(u16),
  #[error("request timed out")]
  Timeout,
}
