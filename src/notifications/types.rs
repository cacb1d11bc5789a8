use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier prefix for notifications created by favoriting an event.
pub const FAVORITE_EVENT_PREFIX: &str = "favorite_event_";

/// Identifier prefix for notifications created by favoriting an artist.
pub const ARTIST_PREFIX: &str = "artist_";

/// Which favorites class a notification belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
  FavoriteEvent,
  Artist,
}

/// Data carried with a notification, used for display, for opening the right
/// screen on tap, and for filtered cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
  #[serde(rename = "type")]
  pub kind: NotificationKind,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub artist_id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub artist_name: Option<String>,
  pub event_id: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub event_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub stage: Option<String>,
}

/// A time-triggered local notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
  /// Deterministic; scheduling the same identifier again replaces it
  pub identifier: String,
  pub event_id: String,
  pub artist_id: Option<String>,
  pub trigger_at: DateTime<Utc>,
  pub title: String,
  pub body: String,
  pub payload: NotificationPayload,
}

impl ScheduledNotification {
  pub fn kind(&self) -> NotificationKind {
    self.payload.kind
  }
}

pub fn favorite_event_identifier(event_id: &str) -> String {
  format!("{}{}", FAVORITE_EVENT_PREFIX, event_id)
}

/// `event_key` is the event id, or the ISO start time when the event has none.
pub fn artist_event_identifier(artist_id: &str, event_key: &str) -> String {
  format!("{}{}_event_{}", ARTIST_PREFIX, artist_id, event_key)
}

/// Prefix shared by all notifications of one artist.
pub fn artist_identifier_prefix(artist_id: &str) -> String {
  format!("{}{}_event_", ARTIST_PREFIX, artist_id)
}

/// Outcome of a batch of independent notification operations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
  pub scheduled: usize,
  pub cancelled: usize,
  pub skipped: usize,
  /// Per-item failures; the batch continued past each of them
  pub failures: Vec<(String, crate::error::Failure)>,
}

impl BatchReport {
  pub fn is_clean(&self) -> bool {
    self.failures.is_empty()
  }

  pub(crate) fn absorb(&mut self, other: BatchReport) {
    self.scheduled += other.scheduled;
    self.cancelled += other.cancelled;
    self.skipped += other.skipped;
    self.failures.extend(other.failures);
  }
}
