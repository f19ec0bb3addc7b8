use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Site origin every manifest path is resolved against
  pub origin: Url,
  /// Root document served to navigations when both cache and network miss
  #[serde(default = "default_offline_shell")]
  pub offline_shell: String,
  /// Database path (defaults to $XDG_DATA_HOME/sitecache/cache.db)
  pub database: Option<PathBuf>,
  pub cache: CacheConfig,
  #[serde(default)]
  pub manifest: Manifest,
}

fn default_offline_shell() -> String {
  "/index.html".to_string()
}

fn default_prefix() -> String {
  "site".to_string()
}

/// Version tokens for the two generations. Bumping either one invalidates
/// only that category on the next deployment.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_prefix")]
  pub prefix: String,
  pub static_version: String,
  pub data_version: String,
}

impl CacheConfig {
  pub fn static_name(&self) -> String {
    format!("{}-static-{}", self.prefix, self.static_version)
  }

  pub fn data_name(&self) -> String {
    format!("{}-data-{}", self.prefix, self.data_version)
  }
}

/// Exact pathnames, fixed for a deployment.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
  /// Precached at install time, then served cache-first
  #[serde(default)]
  pub static_paths: Vec<String>,
  /// Served network-first; matched on path only
  #[serde(default)]
  pub data_paths: Vec<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./sitecache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/sitecache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/sitecache/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("sitecache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("sitecache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Invalid config file {}: {}", path.display(), e))
  }

  /// Parse and validate a YAML document.
  pub fn from_yaml(contents: &str) -> Result<Self> {
    let mut config: Config =
      serde_yaml::from_str(contents).map_err(|e| eyre!("Failed to parse config: {}", e))?;
    config.validate()?;
    Ok(config)
  }

  /// Check the document and rewrite every manifest path into the
  /// percent-encoded form `Url::path()` yields for a request.
  fn validate(&mut self) -> Result<()> {
    if !matches!(self.origin.scheme(), "http" | "https") {
      return Err(eyre!("origin must be an http(s) URL, got {}", self.origin));
    }

    for (field, value) in [
      ("cache.prefix", &self.cache.prefix),
      ("cache.static_version", &self.cache.static_version),
      ("cache.data_version", &self.cache.data_version),
    ] {
      if value.trim().is_empty() {
        return Err(eyre!("{} must not be empty", field));
      }
    }

    if self.cache.static_name() == self.cache.data_name() {
      return Err(eyre!(
        "static and data generations resolve to the same name {}",
        self.cache.static_name()
      ));
    }

    self.offline_shell = normalize_path(&self.origin, "offline_shell", &self.offline_shell)?;
    for path in &mut self.manifest.static_paths {
      *path = normalize_path(&self.origin, "manifest.static_paths", path)?;
    }
    for path in &mut self.manifest.data_paths {
      *path = normalize_path(&self.origin, "manifest.data_paths", path)?;
    }

    if !self.manifest.static_paths.contains(&self.offline_shell) {
      tracing::warn!(
        shell = %self.offline_shell,
        "offline shell is not precached; offline navigations will fail until it is fetched once"
      );
    }

    Ok(())
  }

  /// Database location, falling back to the per-user data directory.
  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => crate::cache::SqliteStore::default_path(),
    }
  }
}

/// Validate a manifest path and return it as the origin would see it,
/// e.g. `/img/hero image.png` becomes `/img/hero%20image.png`.
fn normalize_path(origin: &Url, field: &str, path: &str) -> Result<String> {
  validate_path(field, path)?;
  let url = origin
    .join(path)
    .map_err(|e| eyre!("{}: '{}' is not a valid path: {}", field, path, e))?;
  Ok(url.path().to_string())
}

/// Manifest paths are exact pathnames: absolute, no wildcard, no query.
fn validate_path(field: &str, path: &str) -> Result<()> {
  if !path.starts_with('/') {
    return Err(eyre!("{}: '{}' must start with '/'", field, path));
  }
  if path.contains('*') {
    return Err(eyre!("{}: '{}' must not contain wildcards", field, path));
  }
  if path.contains('?') || path.contains('#') {
    return Err(eyre!("{}: '{}' must be a bare path", field, path));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  const SAMPLE: &str = r#"
origin: "https://site.test"
cache:
  static_version: "v2"
  data_version: "v1"
manifest:
  static_paths: ["/", "/index.html", "/app.js"]
  data_paths: ["/data/videos.json"]
"#;

  #[test]
  fn test_parse_with_defaults() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(config.origin.as_str(), "https://site.test/");
    assert_eq!(config.offline_shell, "/index.html");
    assert_eq!(config.cache.prefix, "site");
    assert!(config.database.is_none());
    assert_eq!(config.manifest.static_paths.len(), 3);
  }

  #[test]
  fn test_generation_names() {
    let config = Config::from_yaml(SAMPLE).unwrap();
    assert_eq!(config.cache.static_name(), "site-static-v2");
    assert_eq!(config.cache.data_name(), "site-data-v1");
  }

  #[test]
  fn test_rejects_relative_path() {
    let yaml = SAMPLE.replace("\"/app.js\"", "\"app.js\"");
    assert!(Config::from_yaml(&yaml).is_err());
  }

  #[test]
  fn test_rejects_wildcard() {
    let yaml = SAMPLE.replace("/data/videos.json", "/data/*");
    assert!(Config::from_yaml(&yaml).is_err());
  }

  #[test]
  fn test_rejects_query_in_manifest() {
    let yaml = SAMPLE.replace("/data/videos.json", "/data/videos.json?x=1");
    assert!(Config::from_yaml(&yaml).is_err());
  }

  #[test]
  fn test_rejects_empty_version() {
    let yaml = SAMPLE.replace("\"v2\"", "\"\"");
    assert!(Config::from_yaml(&yaml).is_err());
  }

  #[test]
  fn test_rejects_non_http_origin() {
    let yaml = SAMPLE.replace("https://site.test", "file:///srv/site");
    assert!(Config::from_yaml(&yaml).is_err());
  }

  #[test]
  fn test_paths_are_percent_encoded() {
    let yaml = SAMPLE
      .replace("\"/app.js\"", "\"/img/hero image.png\"")
      .replace("/data/videos.json", "/data/café.json");
    let config = Config::from_yaml(&yaml).unwrap();

    assert!(config
      .manifest
      .static_paths
      .contains(&"/img/hero%20image.png".to_string()));
    assert_eq!(config.manifest.data_paths, vec!["/data/caf%C3%A9.json"]);
  }

  #[test]
  fn test_dot_segments_are_resolved() {
    let yaml = SAMPLE.replace("\"/app.js\"", "\"/js/../app.js\"");
    let config = Config::from_yaml(&yaml).unwrap();
    assert!(config.manifest.static_paths.contains(&"/app.js".to_string()));
  }

  #[test]
  fn test_load_explicit_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("sitecache.yaml");
    std::fs::write(&path, SAMPLE).unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.manifest.data_paths, vec!["/data/videos.json"]);
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("missing.yaml");
    assert!(Config::load(Some(&path)).is_err());
  }

  #[test]
  fn test_database_path_override() {
    let yaml = format!("{}database: /tmp/sc/cache.db\n", SAMPLE);
    let config = Config::from_yaml(&yaml).unwrap();
    assert_eq!(
      config.database_path().unwrap(),
      PathBuf::from("/tmp/sc/cache.db")
    );
  }
}
