//! Contracts of the external collaborators the core consumes.
//!
//! Platform SDKs (reachability, remote config, content fetch, local
//! notifications, the navigator) are wrapped behind these traits. Every method
//! is assumed fallible; the core reaches a defined outcome even when all of
//! them fail.

mod http;
mod memory;

use async_trait::async_trait;
use serde_json::Value;

use crate::content::ContentKind;
use crate::error::Failure;
use crate::navigation::Route;
use crate::notifications::ScheduledNotification;

pub use http::{HttpContentFetcher, HttpProbe, HttpRemoteConfig};
pub use memory::{
  FixedProbe, MemoryNotificationCenter, RecordingNavigator, StaticContentFetcher,
  StaticRemoteConfig,
};

/// Reports current reachability.
#[async_trait]
pub trait NetworkProbe: Send + Sync {
  async fn is_online(&self) -> bool;
}

/// Remote key/value config with local defaults.
#[async_trait]
pub trait RemoteConfigClient: Send + Sync {
  /// Load defaults, and fetch remote values when `fetch_remote` is set.
  async fn initialize(&self, fetch_remote: bool) -> Result<(), Failure>;

  fn get_string(&self, key: &str) -> Option<String>;

  fn get_bool(&self, key: &str) -> Option<bool>;
}

/// Fetches one content type from the upstream API.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
  async fn fetch(&self, kind: ContentKind) -> Result<Value, Failure>;
}

/// The platform's local notification primitive.
#[async_trait]
pub trait NotificationCenter: Send + Sync {
  async fn permission_granted(&self) -> bool;

  /// Schedule a notification, replacing any with the same identifier.
  async fn schedule(&self, notification: ScheduledNotification) -> Result<(), Failure>;

  /// Cancel by identifier. Cancelling an unknown identifier is not an error.
  async fn cancel(&self, identifier: &str) -> Result<(), Failure>;

  /// All notifications currently pending delivery.
  async fn scheduled(&self) -> Result<Vec<ScheduledNotification>, Failure>;

  /// Hook up tap/receive listeners. Called once per bootstrap attempt.
  async fn register_listeners(&self) -> Result<(), Failure> {
    Ok(())
  }
}

fn config_string(value: Option<&Value>) -> Option<String> {
  match value? {
    Value::String(s) => Some(s.clone()),
    Value::Null => None,
    other => Some(other.to_string()),
  }
}

fn config_bool(value: Option<&Value>) -> Option<bool> {
  match value? {
    Value::Bool(b) => Some(*b),
    Value::String(s) => s.trim().parse().ok(),
    _ => None,
  }
}

/// The app's navigator, which may not be attached yet.
pub trait NavigationSurface: Send + Sync {
  fn is_attached(&self) -> bool;

  fn navigate(&self, route: &Route) -> Result<(), Failure>;
}
