//! Core traits and types for the generation store.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::{Deserialize, Serialize};

use super::key::RequestKey;

/// A stored or live HTTP response.
///
/// Cloning a response is how a policy duplicates it: one copy goes back to
/// the caller, the other into a background store write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
    self.headers.push((name.into(), value.into()));
    self
  }

  /// Synthetic response returned for a data request with neither network
  /// nor a stored copy.
  pub fn offline() -> Self {
    Self::new(503, "Offline").with_header("content-type", "text/plain;charset=UTF-8")
  }

  /// Whether the status is in the 2xx range.
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// First header value matching `name`, case-insensitively.
  #[allow(dead_code)]
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  #[allow(dead_code)]
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

/// A response read back from a generation.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  pub response: Response,
  /// When the entry was written
  #[allow(dead_code)]
  pub stored_at: DateTime<Utc>,
}

/// Summary of one generation, used for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInfo {
  pub name: String,
  pub entries: usize,
}

/// Trait for generation store backends.
///
/// A store holds any number of named generations, each a map from
/// request key to response. Every method is atomic from the caller's point
/// of view: a concurrent reader sees either the previous or the new entry,
/// never a partial one.
pub trait CacheStore: Send + Sync {
  /// Create the generation if it does not exist yet.
  fn open(&self, generation: &str) -> Result<()>;

  /// Look up a single entry.
  fn get(&self, generation: &str, key: &RequestKey) -> Result<Option<StoredEntry>>;

  /// Store a response, creating the generation on first write.
  fn put(&self, generation: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Store several responses in one transaction: either all land or none.
  fn put_all(&self, generation: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Record that the generation finished its install step.
  fn mark_installed(&self, generation: &str) -> Result<()>;

  /// Whether a completed install was recorded for the generation.
  fn is_installed(&self, generation: &str) -> Result<bool>;

  /// Remove a single entry. Returns whether it existed.
  #[allow(dead_code)]
  fn delete_entry(&self, generation: &str, key: &RequestKey) -> Result<bool>;

  /// Remove a generation and all of its entries. Returns whether it existed.
  fn delete(&self, generation: &str) -> Result<bool>;

  /// Names of all generations currently present.
  fn names(&self) -> Result<Vec<String>>;

  /// Keys stored in a generation, as their readable descriptions.
  fn keys(&self, generation: &str) -> Result<Vec<String>>;

  /// Names together with entry counts.
  fn generations(&self) -> Result<Vec<GenerationInfo>> {
    self
      .names()?
      .into_iter()
      .map(|name| {
        let entries = self.keys(&name)?.len();
        Ok(GenerationInfo { name, entries })
      })
      .collect()
  }
}
