//! Generation store: named, versioned sets of request → response entries.
//!
//! This module knows nothing about policies or lifecycle. It provides:
//! - Normalized request keys (method + path, optionally the query)
//! - A `CacheStore` trait with open/get/put/delete/enumerate
//! - A SQLite implementation with atomic writes

mod key;
mod storage;
mod traits;

pub use key::RequestKey;
pub use storage::SqliteStore;
pub use traits::{CacheStore, GenerationInfo, Response, StoredEntry};
