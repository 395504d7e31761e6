use std::path::{Path, PathBuf};

use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  /// Override for the cache database location (defaults under the platform
  /// data directory).
  pub store_path: Option<PathBuf>,
  #[serde(default)]
  pub shell: ShellConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the hosted database service.
  pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShellConfig {
  /// Shell URLs precached by the gateway install phase.
  #[serde(default = "default_shell_urls")]
  pub urls: Vec<String>,
}

impl Default for ShellConfig {
  fn default() -> Self {
    Self {
      urls: default_shell_urls(),
    }
  }
}

fn default_shell_urls() -> Vec<String> {
  crate::gateway::STATIC_CACHE_URLS
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./moosync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/moosync/config.yaml
  /// 4. ~/.config/moosync/config.yaml
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
        "No configuration file found. Create one at ~/.config/moosync/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("moosync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("moosync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// The remote service base URL, parsed.
  pub fn remote_url(&self) -> Result<Url> {
    Url::parse(&self.remote.url)
      .map_err(|e| eyre!("Invalid remote url {}: {}", self.remote.url, e))
  }

  /// Get the remote service API key from the environment.
  pub fn api_key() -> Result<String> {
    std::env::var("MOOSYNC_API_KEY")
      .map_err(|_| eyre!("Remote API key not found. Set the MOOSYNC_API_KEY environment variable."))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_minimal_config() {
    let config: Config = serde_yaml::from_str(
      "remote:\n  url: https://project.example.co\n",
    )
    .unwrap();
    assert_eq!(config.remote.url, "https://project.example.co");
    assert!(config.store_path.is_none());
    // Shell precache falls back to the built-in manifest.
    assert_eq!(config.shell.urls, default_shell_urls());
  }

  #[test]
  fn parses_overrides() {
    let config: Config = serde_yaml::from_str(
      "remote:\n  url: https://project.example.co\nstore_path: /tmp/moo/cache.db\nshell:\n  urls:\n    - /\n    - /reports\n",
    )
    .unwrap();
    assert_eq!(config.store_path, Some(PathBuf::from("/tmp/moo/cache.db")));
    assert_eq!(config.shell.urls, vec!["/".to_string(), "/reports".to_string()]);
    assert!(config.remote_url().is_ok());
  }

  #[test]
  fn rejects_a_bad_remote_url() {
    let config = Config {
      remote: RemoteConfig {
        url: "not a url".into(),
      },
      store_path: None,
      shell: ShellConfig::default(),
    };
    assert!(config.remote_url().is_err());
  }
}
