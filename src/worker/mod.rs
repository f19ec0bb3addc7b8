//! Request-interception layer.
//!
//! A `CacheManager` is built once per deployment from the configuration. It
//! owns the two current generation names and drives:
//! - install / activate (see `lifecycle`)
//! - per-request routing (see `router`)
//! - the network-first and cache-first policies (see `policy`)

mod lifecycle;
mod policy;
mod router;

pub use lifecycle::{CleanupReport, LifecycleState, Population, PopulateReport};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use url::Url;

use crate::cache::CacheStore;
use crate::config::{Config, Manifest};
use crate::network::Fetcher;

/// Drives the generation store for one deployment.
pub struct CacheManager<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  origin: Url,
  manifest: Manifest,
  offline_shell: String,
  static_name: String,
  data_name: String,
  state: Mutex<LifecycleState>,
  /// Set by the claim step; requests bypass the cache until then
  controlling: AtomicBool,
  /// Detached store writes not yet known to be finished
  writes: Mutex<Vec<JoinHandle<()>>>,
}

impl<S: CacheStore + 'static, F: Fetcher> CacheManager<S, F> {
  pub fn new(config: &Config, store: Arc<S>, fetcher: Arc<F>) -> Self {
    Self {
      store,
      fetcher,
      origin: config.origin.clone(),
      manifest: config.manifest.clone(),
      offline_shell: config.offline_shell.clone(),
      static_name: config.cache.static_name(),
      data_name: config.cache.data_name(),
      state: Mutex::new(LifecycleState::Installing),
      controlling: AtomicBool::new(false),
      writes: Mutex::new(Vec::new()),
    }
  }

  #[allow(dead_code)]
  pub fn static_name(&self) -> &str {
    &self.static_name
  }

  #[allow(dead_code)]
  pub fn data_name(&self) -> &str {
    &self.data_name
  }

  pub fn is_controlling(&self) -> bool {
    self.controlling.load(Ordering::SeqCst)
  }

  /// Wait for every background store write issued so far.
  ///
  /// Responses never wait on this; it exists so a short-lived process does
  /// not drop writes when its runtime shuts down.
  pub async fn flush(&self) {
    let pending = match self.writes.lock() {
      Ok(mut writes) => std::mem::take(&mut *writes),
      Err(e) => {
        tracing::warn!("write tracker poisoned: {}", e);
        return;
      }
    };

    for handle in pending {
      if let Err(e) = handle.await {
        tracing::warn!("background store write panicked: {}", e);
      }
    }
  }

  fn track_write(&self, handle: JoinHandle<()>) {
    match self.writes.lock() {
      Ok(mut writes) => {
        writes.retain(|h| !h.is_finished());
        writes.push(handle);
      }
      // The write still runs; it just cannot be flushed.
      Err(e) => tracing::warn!("write tracker poisoned: {}", e),
    }
  }
}
