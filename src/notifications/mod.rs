//! Favorite-driven local notifications.

mod scheduler;
mod types;

pub use scheduler::{
  check_lead_time, NotificationScheduler, ScheduleOutcome, DEFAULT_LEAD_TIME_MINUTES,
  LEAD_TIME_KEY, MAX_LEAD_TIME_MINUTES, MIN_SAFETY_OFFSET_SECS,
};
pub use types::{
  artist_event_identifier, artist_identifier_prefix, favorite_event_identifier, BatchReport,
  NotificationKind, NotificationPayload, ScheduledNotification, ARTIST_PREFIX,
  FAVORITE_EVENT_PREFIX,
};
