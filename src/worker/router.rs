//! Per-request classification and dispatch.

use color_eyre::Result;
use tracing::debug;

use crate::cache::{CacheStore, Response};
use crate::network::{Fetcher, Request};

use super::CacheManager;

/// Which policy serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
  /// Network-first, backed by the data generation
  Data,
  /// Cache-first, backed by the static generation
  Static,
}

/// Exact path match against the data list; the query string never matters.
pub fn classify(data_paths: &[String], request: &Request) -> Route {
  let path = request.path();
  if data_paths.iter().any(|p| p == path) {
    Route::Data
  } else {
    Route::Static
  }
}

impl<S: CacheStore + 'static, F: Fetcher> CacheManager<S, F> {
  pub fn classify(&self, request: &Request) -> Route {
    classify(&self.manifest.data_paths, request)
  }

  /// Serve one intercepted request.
  ///
  /// An error means the fetch stays unresolved: the only such case is a
  /// non-navigation static request with neither cache nor network.
  pub async fn route(&self, request: &Request) -> Result<Response> {
    if !self.is_controlling() {
      debug!(url = %request.url, "not yet claimed, going straight to network");
      return self.fetcher.fetch(request).await;
    }

    match self.classify(request) {
      Route::Data => self.network_first(request).await,
      Route::Static => self.cache_first(request).await,
    }
  }
}
