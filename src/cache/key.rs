//! Normalized request identity used as the entry key.

use reqwest::Method;
use sha2::{Digest, Sha256};
use url::Url;

/// Key for an entry within a generation: method plus path, with or without
/// the query string.
///
/// The origin is not part of the key; a store only ever holds responses for
/// the configured site.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  description: String,
}

impl RequestKey {
  /// Key including the query string. Used by the static generation.
  pub fn exact(method: &Method, url: &Url) -> Self {
    let description = match url.query() {
      Some(query) => format!("{} {}?{}", method, url.path(), query),
      None => format!("{} {}", method, url.path()),
    };
    Self { description }
  }

  /// Key ignoring the query string. Used by the data generation.
  pub fn ignoring_query(method: &Method, url: &Url) -> Self {
    Self {
      description: format!("{} {}", method, url.path()),
    }
  }

  /// Key for a GET of a site-relative path, as listed in the manifest.
  pub fn get(path: &str) -> Self {
    Self {
      description: format!("{} {}", Method::GET, path),
    }
  }

  /// SHA256 of the description, for stable fixed-length storage keys.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.description.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human-readable form, e.g. `GET /data/videos.json`.
  pub fn description(&self) -> &str {
    &self.description
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.description)
  }
}
