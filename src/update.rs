//! Update gate: classifies how urgently the running app must be updated.

use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

use crate::platform::RemoteConfigClient;

pub const LATEST_VERSION_KEY: &str = "latest_version";
pub const MIN_REQUIRED_VERSION_KEY: &str = "min_required_version";
pub const FORCE_UPDATE_KEY: &str = "force_update_enabled";
pub const WHATS_NEW_KEY: &str = "whats_new";

/// Shown when the remote release notes are missing or unreadable.
pub const DEFAULT_WHATS_NEW: &[&str] = &[
  "Performance improvements",
  "Bug fixes",
];

/// Update urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateKind {
  /// Blocks the app until the user updates
  Forced,
  /// The user may dismiss or skip it
  Optional,
  None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateInfo {
  pub kind: UpdateKind,
  pub latest_version: String,
  pub whats_new: Vec<String>,
}

impl UpdateInfo {
  pub fn none(latest_version: impl Into<String>) -> Self {
    Self {
      kind: UpdateKind::None,
      latest_version: latest_version.into(),
      whats_new: Vec::new(),
    }
  }
}

/// Compare dot-separated versions component-wise as integers.
///
/// Missing components count as 0 and non-numeric components are read up to
/// their first non-digit, so `1.2` == `1.2.0` and `1.10.0` > `1.9.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
  let parse = |v: &str| -> Vec<u64> {
    v.trim()
      .trim_start_matches(['v', 'V'])
      .split('.')
      .map(|part| {
        let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
        digits.parse().unwrap_or(0)
      })
      .collect()
  };

  let (a, b) = (parse(a), parse(b));
  let len = a.len().max(b.len());
  (0..len)
    .map(|i| {
      let x = a.get(i).copied().unwrap_or(0);
      let y = b.get(i).copied().unwrap_or(0);
      x.cmp(&y)
    })
    .find(|ord| *ord != Ordering::Equal)
    .unwrap_or(Ordering::Equal)
}

/// Parse release notes that may be a JSON array or comma/newline-separated
/// text. Never fails; falls back to [`DEFAULT_WHATS_NEW`].
pub fn parse_whats_new(raw: Option<&str>) -> Vec<String> {
  let fallback = || DEFAULT_WHATS_NEW.iter().map(|s| s.to_string()).collect();

  let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
    return fallback();
  };

  let items: Vec<String> = if raw.starts_with('[') {
    match serde_json::from_str::<Vec<serde_json::Value>>(raw) {
      Ok(items) => items
        .iter()
        .filter_map(crate::content::value_to_string)
        .collect(),
      Err(e) => {
        debug!(error = %e, "unreadable release notes");
        return fallback();
      }
    }
  } else {
    raw
      .split([',', '\n'])
      .map(str::to_string)
      .collect()
  };

  let items: Vec<String> = items
    .into_iter()
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .collect();

  if items.is_empty() {
    fallback()
  } else {
    items
  }
}

/// Compares the running version against the remote-advertised versions.
#[derive(Clone)]
pub struct UpdateGate {
  current_version: String,
  remote: Arc<dyn RemoteConfigClient>,
}

impl UpdateGate {
  pub fn new(current_version: impl Into<String>, remote: Arc<dyn RemoteConfigClient>) -> Self {
    Self {
      current_version: current_version.into(),
      remote,
    }
  }

  pub fn current_version(&self) -> &str {
    &self.current_version
  }

  /// Classify the update state. Offline checks never block: they report none.
  pub fn check(&self, online: bool) -> UpdateInfo {
    let current = self.current_version.as_str();
    if !online {
      return UpdateInfo::none(current);
    }

    let latest = self
      .remote
      .get_string(LATEST_VERSION_KEY)
      .unwrap_or_else(|| current.to_string());
    let min_required = self
      .remote
      .get_string(MIN_REQUIRED_VERSION_KEY)
      .unwrap_or_else(|| current.to_string());
    let force_enabled = self.remote.get_bool(FORCE_UPDATE_KEY).unwrap_or(false);

    let kind = if force_enabled && compare_versions(current, &min_required) == Ordering::Less {
      UpdateKind::Forced
    } else if compare_versions(current, &latest) == Ordering::Less {
      UpdateKind::Optional
    } else {
      UpdateKind::None
    };

    let whats_new = match kind {
      UpdateKind::None => Vec::new(),
      _ => parse_whats_new(self.remote.get_string(WHATS_NEW_KEY).as_deref()),
    };

    info!(current, %latest, %min_required, force_enabled, ?kind, "update check");
    UpdateInfo {
      kind,
      latest_version: latest,
      whats_new,
    }
  }
}
