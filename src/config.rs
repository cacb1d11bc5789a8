use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use url::Url;

use crate::notifications::check_lead_time;
use crate::update::{
  FORCE_UPDATE_KEY, LATEST_VERSION_KEY, MIN_REQUIRED_VERSION_KEY, WHATS_NEW_KEY,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  /// Version of the running app (defaults to this package's version)
  pub app_version: Option<String>,
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub deep_links: DeepLinkConfig,
  #[serde(default)]
  pub notifications: NotificationConfig,
  #[serde(default)]
  pub remote_defaults: RemoteDefaults,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Root of the content API; content types are fetched relative to it
  pub base_url: Option<Url>,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: None,
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_timeout_secs() -> u64 {
  10
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeepLinkConfig {
  /// Custom URI scheme, e.g. `festival` for `festival://artist/12`
  #[serde(default = "default_scheme")]
  pub scheme: String,
  /// Web hosts whose https links open in the app
  #[serde(default)]
  pub hosts: Vec<String>,
}

impl Default for DeepLinkConfig {
  fn default() -> Self {
    Self {
      scheme: default_scheme(),
      hosts: Vec::new(),
    }
  }
}

fn default_scheme() -> String {
  "festival".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
  /// Minutes before an event starts that its reminder fires
  #[serde(default = "default_lead_time")]
  pub lead_time_minutes: i64,
}

impl Default for NotificationConfig {
  fn default() -> Self {
    Self {
      lead_time_minutes: default_lead_time(),
    }
  }
}

fn default_lead_time() -> i64 {
  crate::notifications::DEFAULT_LEAD_TIME_MINUTES
}

/// Local defaults served by remote config before (or instead of) a fetch.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteDefaults {
  pub latest_version: Option<String>,
  pub min_required_version: Option<String>,
  #[serde(default)]
  pub force_update_enabled: bool,
  #[serde(default)]
  pub whats_new: Vec<String>,
}

impl RemoteDefaults {
  /// Default values keyed the way remote config keys them.
  ///
  /// Versions default to the running version, so the update gate stays quiet
  /// until the remote says otherwise.
  pub fn to_values(&self, app_version: &str) -> HashMap<String, Value> {
    let mut values = HashMap::new();
    values.insert(
      LATEST_VERSION_KEY.to_string(),
      Value::String(self.latest_version.clone().unwrap_or_else(|| app_version.to_string())),
    );
    values.insert(
      MIN_REQUIRED_VERSION_KEY.to_string(),
      Value::String(
        self
          .min_required_version
          .clone()
          .unwrap_or_else(|| app_version.to_string()),
      ),
    );
    values.insert(
      FORCE_UPDATE_KEY.to_string(),
      Value::Bool(self.force_update_enabled),
    );
    if !self.whats_new.is_empty() {
      values.insert(
        WHATS_NEW_KEY.to_string(),
        Value::String(self.whats_new.join(",")),
      );
    }
    values
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Override for the SQLite cache file
  pub path: Option<PathBuf>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./lineup.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/lineup/config.yaml
  ///
  /// Without any file, built-in defaults apply.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("lineup.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("lineup").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    check_lead_time(config.notifications.lead_time_minutes)
      .map_err(|e| eyre!("notifications.lead_time_minutes: {}", e))?;
    Ok(config)
  }

  pub fn app_version(&self) -> String {
    self
      .app_version
      .clone()
      .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string())
  }

  /// Base URL of the content API, required for networked launches.
  pub fn base_url(&self) -> Result<&Url> {
    self.api.base_url.as_ref().ok_or_else(|| {
      eyre!("No API base URL configured. Set api.base_url in ~/.config/lineup/config.yaml")
    })
  }

  /// Get the optional API token from the environment.
  ///
  /// Checks LINEUP_API_TOKEN.
  pub fn api_token() -> Option<String> {
    std::env::var("LINEUP_API_TOKEN")
      .ok()
      .filter(|token| !token.trim().is_empty())
  }
}
