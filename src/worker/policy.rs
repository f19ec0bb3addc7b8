//! The two serving strategies.

use color_eyre::Result;
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheStore, RequestKey, Response};
use crate::network::{Fetcher, Request};

use super::CacheManager;

impl<S: CacheStore + 'static, F: Fetcher> CacheManager<S, F> {
  /// Network-first for data feeds.
  ///
  /// 1. Fetch from network; on success store a copy in the background and
  ///    return the live response
  /// 2. On failure serve the stored copy
  /// 3. With no stored copy either, answer 503 `Offline`
  pub(super) async fn network_first(&self, request: &Request) -> Result<Response> {
    let key = RequestKey::ignoring_query(&request.method, &request.url);

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.store_in_background(&self.data_name, request, key, response.clone());
        Ok(response)
      }
      Err(e) => {
        debug!(url = %request.url, "data fetch failed: {}", e);
        match self.lookup(&self.data_name, &key) {
          Some(stored) => {
            debug!(%key, "serving last stored data");
            Ok(stored)
          }
          None => {
            warn!(%key, "offline with no stored copy");
            Ok(Response::offline())
          }
        }
      }
    }
  }

  /// Cache-first for static assets.
  ///
  /// 1. Serve a stored copy without touching the network
  /// 2. On a miss fetch, store a copy in the background, return the response
  /// 3. If that fails too, navigations get the offline shell; everything else
  ///    fails
  pub(super) async fn cache_first(&self, request: &Request) -> Result<Response> {
    let key = RequestKey::exact(&request.method, &request.url);

    if let Some(stored) = self.lookup(&self.static_name, &key) {
      debug!(%key, "static hit");
      return Ok(stored);
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        self.store_in_background(&self.static_name, request, key, response.clone());
        Ok(response)
      }
      Err(e) if request.is_navigation() => {
        let shell_key = RequestKey::get(&self.offline_shell);
        match self.lookup(&self.static_name, &shell_key) {
          Some(shell) => {
            debug!(url = %request.url, "serving offline shell");
            Ok(shell)
          }
          None => Err(e.wrap_err(format!("offline shell {} is not stored", self.offline_shell))),
        }
      }
      Err(e) => Err(e),
    }
  }

  /// Read an entry, treating a store failure as a miss.
  fn lookup(&self, generation: &str, key: &RequestKey) -> Option<Response> {
    match self.store.get(generation, key) {
      Ok(entry) => entry.map(|e| e.response),
      Err(e) => {
        warn!(%generation, %key, "store read failed: {}", e);
        None
      }
    }
  }

  /// Fire-and-forget write. The caller already holds its own copy of the
  /// response and never waits on this.
  fn store_in_background(
    &self,
    generation: &str,
    request: &Request,
    key: RequestKey,
    response: Response,
  ) {
    if request.method != Method::GET {
      debug!(%key, "not storing non-GET response");
      return;
    }

    let store = Arc::clone(&self.store);
    let generation = generation.to_string();
    let handle = tokio::spawn(async move {
      match store.put(&generation, &key, &response) {
        Ok(()) => debug!(%generation, %key, "stored"),
        Err(e) => warn!(%generation, %key, "background store failed: {}", e),
      }
    });
    self.track_write(handle);
  }
}
