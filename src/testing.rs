//! Shared test doubles.

use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::cache::Response;
use crate::config::Config;
use crate::network::{Fetcher, Request};

pub const STATIC_PATHS: [&str; 4] = ["/", "/index.html", "/app.js", "/styles.css"];
pub const DATA_PATHS: [&str; 2] = ["/data/videos.json", "/data/jokes.json"];

pub fn test_config(static_version: &str, data_version: &str) -> Config {
  config_with_paths(static_version, data_version, &STATIC_PATHS, &DATA_PATHS)
}

pub fn config_with_paths(
  static_version: &str,
  data_version: &str,
  static_paths: &[&str],
  data_paths: &[&str],
) -> Config {
  let quote = |paths: &[&str]| {
    paths
      .iter()
      .map(|p| format!("\"{}\"", p))
      .collect::<Vec<_>>()
      .join(", ")
  };
  let yaml = format!(
    "origin: \"https://site.test\"\n\
     cache:\n  static_version: \"{}\"\n  data_version: \"{}\"\n\
     manifest:\n  static_paths: [{}]\n  data_paths: [{}]\n",
    static_version,
    data_version,
    quote(static_paths),
    quote(data_paths),
  );
  Config::from_yaml(&yaml).unwrap()
}

pub fn url(path: &str) -> Url {
  Url::parse("https://site.test").unwrap().join(path).unwrap()
}

/// In-process network: serves scripted responses by path and can be taken
/// offline. Unknown paths answer 404.
pub struct ScriptedNetwork {
  routes: Mutex<HashMap<String, Response>>,
  online: AtomicBool,
  calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
  pub fn new() -> Self {
    Self {
      routes: Mutex::new(HashMap::new()),
      online: AtomicBool::new(true),
      calls: Mutex::new(Vec::new()),
    }
  }

  /// Network serving every test manifest path with a body naming the path.
  pub fn with_site() -> Self {
    let network = Self::new();
    for path in STATIC_PATHS.iter().chain(DATA_PATHS.iter()) {
      network.serve(path, Response::new(200, format!("live {}", path)));
    }
    network
  }

  pub fn serve(&self, path: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(path.to_string(), response);
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }

  /// Number of fetches issued for `path`, whether or not they succeeded.
  pub fn calls_to(&self, path: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|p| p.as_str() == path)
      .count()
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

impl Fetcher for ScriptedNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let path = request.url.path().to_string();
    self.calls.lock().unwrap().push(path.clone());

    if !self.online.load(Ordering::SeqCst) {
      return Err(eyre!("Network unavailable: {}", request.url));
    }

    let response = self.routes.lock().unwrap().get(&path).cloned();
    Ok(response.unwrap_or_else(|| Response::new(404, "Not Found")))
  }
}

/// Poll `check` until it yields a value or a second passes.
///
/// Background store writes are only eventually visible.
pub async fn eventually<T>(mut check: impl FnMut() -> Option<T>) -> Option<T> {
  for _ in 0..100 {
    if let Some(value) = check() {
      return Some(value);
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  None
}
