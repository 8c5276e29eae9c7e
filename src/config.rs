use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("config file not found: {0}")]
  NotFound(String),
  #[error("failed to read config file {path}: {source}")]
  Read {
    path: String,
    source: std::io::Error,
  },
  #[error("failed to parse config file {path}: {source}")]
  Parse {
    path: String,
    source: serde_yaml::Error,
  },
  #[error("storage token not found. Set MENUBOARD_STORAGE_TOKEN environment variable")]
  NoToken,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Where the local cache database lives (defaults to the platform data dir)
  pub cache_path: Option<PathBuf>,
  /// Keep the fixed-path legacy mirror for pre-versioning readers.
  /// Disable once no legacy readers remain; reads then skip the legacy
  /// fallback path entirely.
  #[serde(default = "default_legacy_mirror")]
  pub legacy_mirror: bool,
  /// Remote storage endpoint. Absent means local-cache-only operation.
  pub remote: Option<RemoteConfig>,
}

fn default_legacy_mirror() -> bool {
  true
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Storage API root, e.g. "https://example.supabase.co/storage/v1/"
  pub base_url: String,
  /// Bucket holding all owners' asset folders
  pub bucket: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      cache_path: None,
      legacy_mirror: true,
      remote: None,
    }
  }
}

impl SyncConfig {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./menuboard-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/menuboard-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(ConfigError::NotFound(p.display().to_string()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("menuboard-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("menuboard-sync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
      path: path.display().to_string(),
      source: e,
    })?;

    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
      path: path.display().to_string(),
      source: e,
    })
  }

  /// Get the storage API token from environment variables.
  pub fn get_storage_token() -> Result<String, ConfigError> {
    std::env::var("MENUBOARD_STORAGE_TOKEN").map_err(|_| ConfigError::NoToken)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_full_config() {
    let yaml = r#"
cache_path: /tmp/menuboard/cache.db
legacy_mirror: false
remote:
  base_url: https://example.supabase.co/storage/v1/
  bucket: menuboard-assets
"#;
    let config: SyncConfig = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.cache_path, Some(PathBuf::from("/tmp/menuboard/cache.db")));
    assert!(!config.legacy_mirror);
    let remote = config.remote.unwrap();
    assert_eq!(remote.bucket, "menuboard-assets");
  }

  #[test]
  fn legacy_mirror_defaults_on() {
    let config: SyncConfig = serde_yaml::from_str("remote:\n  base_url: x\n  bucket: b\n").unwrap();
    assert!(config.legacy_mirror);
  }

  #[test]
  fn missing_remote_means_local_only() {
    let config: SyncConfig = serde_yaml::from_str("cache_path: /tmp/c.db\n").unwrap();
    assert!(config.remote.is_none());
  }
}
