use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::platform::NetworkProbe;

/// A change to the user's favorites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoriteChange {
  Event { event_id: String, favorite: bool },
  Artist {
    artist_id: String,
    artist_name: String,
    favorite: bool,
  },
}

/// Application events
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
  /// Reachability flipped
  ConnectivityChanged(bool),
  /// The user tapped a notification; carries its data
  NotificationOpened(Map<String, Value>),
  /// The OS handed the app a URI
  DeepLink(String),
  /// The navigation surface signalled readiness
  NavigatorReady,
  FavoriteToggled(FavoriteChange),
  /// Fresh timeline data landed; recompute notifications for the favorites
  TimelineRefreshed {
    favorite_event_ids: Vec<String>,
    favorite_artist_ids: Vec<String>,
  },
  Shutdown,
}

/// Event handler that collects events from the platform and background
/// watchers
pub struct EventHandler {
  tx: mpsc::UnboundedSender<AppEvent>,
  rx: mpsc::UnboundedReceiver<AppEvent>,
}

impl Default for EventHandler {
  fn default() -> Self {
    Self::new()
  }
}

impl EventHandler {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self { tx, rx }
  }

  /// Handle for producers outside the event loop
  pub fn sender(&self) -> mpsc::UnboundedSender<AppEvent> {
    self.tx.clone()
  }

  /// Poll `probe` every `interval` and emit `ConnectivityChanged` whenever
  /// the answer differs from the previous one. The first answer is always
  /// emitted.
  pub fn watch_connectivity(&self, probe: Arc<dyn NetworkProbe>, interval: Duration) -> JoinHandle<()> {
    let tx = self.tx.clone();

    tokio::spawn(async move {
      let mut last = None;
      let mut ticker = tokio::time::interval(interval);
      loop {
        ticker.tick().await;
        let online = probe.is_online().await;
        if last == Some(online) {
          continue;
        }
        debug!(online, "connectivity changed");
        last = Some(online);
        if tx.send(AppEvent::ConnectivityChanged(online)).is_err() {
          break;
        }
      }
    })
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<AppEvent> {
    self.rx.recv().await
  }
}
