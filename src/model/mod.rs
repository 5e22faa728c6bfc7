//! Domain model: entities, persisted records, and the mapper between them.

pub mod mapper;
pub mod records;
pub mod types;

pub use records::{BookmarkRecord, UserRecord};
pub use types::{Bookmark, User};
