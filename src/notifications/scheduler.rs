use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::types::{
  artist_event_identifier, artist_identifier_prefix, favorite_event_identifier, BatchReport,
  NotificationKind, NotificationPayload, ScheduledNotification, ARTIST_PREFIX,
  FAVORITE_EVENT_PREFIX,
};
use crate::cache::CacheStore;
use crate::content::{artist_list, timeline_events, Artist, ContentKind, TimelineEvent};
use crate::error::Failure;
use crate::platform::NotificationCenter;

pub const DEFAULT_LEAD_TIME_MINUTES: i64 = 10;

/// One week.
pub const MAX_LEAD_TIME_MINUTES: i64 = 7 * 24 * 60;

/// Triggers closer than this to now are not scheduled.
pub const MIN_SAFETY_OFFSET_SECS: i64 = 5;

/// Marker holding the user's lead time preference in minutes.
pub const LEAD_TIME_KEY: &str = "notification_lead_time";

/// What happened to a single schedule request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
  Scheduled {
    identifier: String,
    trigger_at: DateTime<Utc>,
  },
  /// Trigger instant is not far enough in the future; any earlier instance
  /// was cancelled
  TooLate { identifier: String },
  /// No trigger instant can be derived for the event; any earlier instance
  /// was cancelled
  Unschedulable,
  PermissionMissing,
}

/// Accepts lead times between zero and [`MAX_LEAD_TIME_MINUTES`].
pub fn check_lead_time(minutes: i64) -> Result<i64, Failure> {
  if (0..=MAX_LEAD_TIME_MINUTES).contains(&minutes) {
    Ok(minutes)
  } else {
    Err(Failure::InvalidPayload(format!(
      "lead time must be between 0 and {} minutes, got {}",
      MAX_LEAD_TIME_MINUTES, minutes
    )))
  }
}

/// Turns favorites into time-triggered local notifications.
///
/// Identifiers are deterministic, so scheduling the same logical notification
/// again replaces the pending one.
#[derive(Clone)]
pub struct NotificationScheduler {
  center: Arc<dyn NotificationCenter>,
  cache: CacheStore,
  lead_time_minutes: Arc<AtomicI64>,
}

impl NotificationScheduler {
  /// The persisted lead time wins over `default_lead_minutes`.
  pub fn new(center: Arc<dyn NotificationCenter>, cache: CacheStore, default_lead_minutes: i64) -> Self {
    let lead = cache
      .marker(LEAD_TIME_KEY)
      .and_then(|raw| raw.trim().parse::<i64>().ok())
      .and_then(|minutes| check_lead_time(minutes).ok())
      .unwrap_or(default_lead_minutes);

    Self {
      center,
      cache,
      lead_time_minutes: Arc::new(AtomicI64::new(lead)),
    }
  }

  /// Use `minutes` for this instance only, without persisting it.
  pub fn with_lead_time(mut self, minutes: i64) -> Result<Self, Failure> {
    let minutes = check_lead_time(minutes)?;
    self.lead_time_minutes = Arc::new(AtomicI64::new(minutes));
    Ok(self)
  }

  pub fn lead_time_minutes(&self) -> i64 {
    self.lead_time_minutes.load(Ordering::SeqCst)
  }

  /// Persist a new lead time. Pending notifications keep their old trigger
  /// until the next recompute.
  pub fn set_lead_time(&self, minutes: i64) -> Result<(), Failure> {
    let minutes = check_lead_time(minutes)?;
    self.cache.set_marker(LEAD_TIME_KEY, &minutes.to_string())?;
    self.lead_time_minutes.store(minutes, Ordering::SeqCst);
    info!(minutes, "notification lead time updated");
    Ok(())
  }

  /// `start - lead time`, or `None` when that instant is out of range.
  fn trigger_for(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Duration::try_minutes(self.lead_time_minutes()).and_then(|lead| start.checked_sub_signed(lead))
  }

  /// Whether `trigger` is still far enough ahead to be worth firing.
  fn is_ahead(&self, trigger: DateTime<Utc>) -> bool {
    Duration::try_seconds(MIN_SAFETY_OFFSET_SECS)
      .and_then(|offset| self.cache.now().checked_add_signed(offset))
      .is_some_and(|earliest| trigger > earliest)
  }

  async fn has_permission(&self) -> bool {
    let granted = self.center.permission_granted().await;
    if !granted {
      debug!("notification permission missing, skipping");
    }
    granted
  }

  fn cached_timeline(&self) -> Option<Vec<TimelineEvent>> {
    self
      .cache
      .load::<Value>(ContentKind::Timeline.cache_key())
      .map(|payload| timeline_events(&payload))
  }

  fn artist_names(&self) -> HashMap<String, String> {
    self
      .cache
      .load::<Value>(ContentKind::Artists.cache_key())
      .map(|payload| artist_list(&payload))
      .unwrap_or_default()
      .into_iter()
      .map(|artist| (artist.id, artist.name))
      .collect()
  }

  /// Schedule the reminder for one favorited event.
  pub async fn schedule_for_event(
    &self,
    event_id: &str,
    event: &TimelineEvent,
    artist_name: Option<&str>,
  ) -> Result<ScheduleOutcome, Failure> {
    if !self.has_permission().await {
      return Ok(ScheduleOutcome::PermissionMissing);
    }
    self.schedule_event(event_id, event, artist_name).await
  }

  async fn schedule_event(
    &self,
    event_id: &str,
    event: &TimelineEvent,
    artist_name: Option<&str>,
  ) -> Result<ScheduleOutcome, Failure> {
    let identifier = favorite_event_identifier(event_id);
    let artist_name = artist_name.filter(|name| !name.is_empty());

    let payload = NotificationPayload {
      kind: NotificationKind::FavoriteEvent,
      artist_id: event.interpret_id.clone(),
      artist_name: artist_name.map(str::to_string),
      event_id: event_id.to_string(),
      event_name: event.name.clone(),
      stage: event.stage_name(),
    };
    let headline = artist_name
      .map(str::to_string)
      .or_else(|| event.name.clone())
      .unwrap_or_else(|| "Your favorite".to_string());

    self.place(identifier, event, headline, payload).await
  }

  /// Drop a pending instance that can no longer be replaced.
  async fn discard(&self, identifier: &str) {
    if let Err(e) = self.center.cancel(identifier).await {
      warn!(identifier, error = %e, "failed to cancel outdated notification");
    }
  }

  /// Cancel-or-schedule one notification for `event`.
  async fn place(
    &self,
    identifier: String,
    event: &TimelineEvent,
    headline: String,
    payload: NotificationPayload,
  ) -> Result<ScheduleOutcome, Failure> {
    let Some(start) = event.start_time() else {
      warn!(identifier, start = %event.start, "event start time unreadable");
      self.discard(&identifier).await;
      return Ok(ScheduleOutcome::Unschedulable);
    };

    let Some(trigger_at) = self.trigger_for(start) else {
      warn!(identifier, %start, "trigger time out of range");
      self.discard(&identifier).await;
      return Ok(ScheduleOutcome::Unschedulable);
    };

    if !self.is_ahead(trigger_at) {
      debug!(identifier, %start, "trigger time already passed");
      self.discard(&identifier).await;
      return Ok(ScheduleOutcome::TooLate { identifier });
    }

    let minutes = self.lead_time_minutes();
    let body = match &payload.stage {
      Some(stage) => format!("Starts in {} minutes on {}", minutes, stage),
      None => format!("Starts in {} minutes", minutes),
    };
    let notification = ScheduledNotification {
      identifier: identifier.clone(),
      event_id: payload.event_id.clone(),
      artist_id: payload.artist_id.clone(),
      trigger_at,
      title: headline,
      body,
      payload,
    };

    match self.center.schedule(notification).await {
      Ok(()) => {
        info!(identifier, %trigger_at, "notification scheduled");
        Ok(ScheduleOutcome::Scheduled {
          identifier,
          trigger_at,
        })
      }
      Err(e) => {
        warn!(identifier, error = %e, "failed to schedule notification");
        Err(e)
      }
    }
  }

  /// Un-favorite one event. Cancelling a notification that does not exist is
  /// a no-op.
  pub async fn cancel_for_event(&self, event_id: &str) -> Result<(), Failure> {
    if !self.has_permission().await {
      return Ok(());
    }
    let identifier = favorite_event_identifier(event_id);
    self.center.cancel(&identifier).await.map_err(|e| {
      warn!(identifier, error = %e, "failed to cancel notification");
      e
    })
  }

  /// Schedule a reminder for every cached timeline slot of the artist.
  pub async fn schedule_for_artist(&self, artist_id: &str, artist_name: &str) -> BatchReport {
    if !self.has_permission().await {
      return BatchReport::default();
    }

    let mut report = self.cancel_matching(|n| is_artist_notification_of(n, artist_id)).await;
    let Some(timeline) = self.cached_timeline() else {
      warn!(artist_id, "no cached timeline, cannot schedule artist notifications");
      return report;
    };
    report.absorb(self.schedule_artist_events(artist_id, artist_name, &timeline).await);
    report
  }

  async fn schedule_artist_events(
    &self,
    artist_id: &str,
    artist_name: &str,
    timeline: &[TimelineEvent],
  ) -> BatchReport {
    let mut report = BatchReport::default();

    for event in timeline
      .iter()
      .filter(|event| event.interpret_id.as_deref() == Some(artist_id))
    {
      let event_key = match (&event.id, event.start_time()) {
        (Some(id), _) => id.clone(),
        (None, Some(start)) => start.to_rfc3339_opts(SecondsFormat::Millis, true),
        (None, None) => event.start.clone(),
      };
      let identifier = artist_event_identifier(artist_id, &event_key);
      let name = Some(artist_name).filter(|name| !name.is_empty());

      let payload = NotificationPayload {
        kind: NotificationKind::Artist,
        artist_id: Some(artist_id.to_string()),
        artist_name: name.map(str::to_string),
        event_id: event_key,
        event_name: event.name.clone(),
        stage: event.stage_name(),
      };
      let headline = name
        .map(str::to_string)
        .or_else(|| event.name.clone())
        .unwrap_or_else(|| "Your artist".to_string());

      match self.place(identifier.clone(), event, headline, payload).await {
        Ok(ScheduleOutcome::Scheduled { .. }) => report.scheduled += 1,
        Ok(_) => report.skipped += 1,
        Err(e) => report.failures.push((identifier, e)),
      }
    }

    debug!(artist_id, scheduled = report.scheduled, skipped = report.skipped, "artist notifications derived");
    report
  }

  /// Cancel every notification of one artist.
  pub async fn cancel_for_artist(&self, artist_id: &str) -> BatchReport {
    if !self.has_permission().await {
      return BatchReport::default();
    }
    self.cancel_matching(|n| is_artist_notification_of(n, artist_id)).await
  }

  pub async fn cancel_all_artist_notifications(&self) -> BatchReport {
    if !self.has_permission().await {
      return BatchReport::default();
    }
    self.cancel_matching(is_artist_notification).await
  }

  pub async fn cancel_all_favorite_notifications(&self) -> BatchReport {
    if !self.has_permission().await {
      return BatchReport::default();
    }
    self.cancel_matching(is_favorite_notification).await
  }

  /// Cancel each pending notification matching `filter` independently.
  async fn cancel_matching<F>(&self, filter: F) -> BatchReport
  where
    F: Fn(&ScheduledNotification) -> bool,
  {
    let mut report = BatchReport::default();
    let pending = match self.center.scheduled().await {
      Ok(pending) => pending,
      Err(e) => {
        warn!(error = %e, "failed to list scheduled notifications");
        report.failures.push(("*".to_string(), e));
        return report;
      }
    };

    for notification in pending.iter().filter(|n| filter(n)) {
      match self.center.cancel(&notification.identifier).await {
        Ok(()) => report.cancelled += 1,
        Err(e) => {
          warn!(identifier = %notification.identifier, error = %e, "failed to cancel notification");
          report.failures.push((notification.identifier.clone(), e));
        }
      }
    }
    report
  }

  /// Rebuild favorite-event notifications from scratch for `favorite_event_ids`.
  pub async fn update_all_event_notifications(&self, favorite_event_ids: &[String]) -> BatchReport {
    if !self.has_permission().await {
      return BatchReport::default();
    }

    let mut report = self.cancel_matching(is_favorite_notification).await;
    if favorite_event_ids.is_empty() {
      return report;
    }

    let Some(timeline) = self.cached_timeline() else {
      warn!("no cached timeline, cannot recompute event notifications");
      report.skipped += favorite_event_ids.len();
      return report;
    };
    let names = self.artist_names();

    for event_id in favorite_event_ids {
      let Some(event) = timeline
        .iter()
        .find(|event| event.id.as_deref() == Some(event_id.as_str()))
      else {
        debug!(event_id, "favorite event not on the timeline");
        report.skipped += 1;
        continue;
      };

      let artist_name = event
        .interpret_id
        .as_ref()
        .and_then(|id| names.get(id))
        .map(String::as_str);
      match self.schedule_event(event_id, event, artist_name).await {
        Ok(ScheduleOutcome::Scheduled { .. }) => report.scheduled += 1,
        Ok(_) => report.skipped += 1,
        Err(e) => report.failures.push((favorite_event_identifier(event_id), e)),
      }
    }

    info!(
      scheduled = report.scheduled,
      cancelled = report.cancelled,
      skipped = report.skipped,
      failed = report.failures.len(),
      "event notifications recomputed"
    );
    report
  }

  /// Rebuild artist notifications from scratch for `favorite_artist_ids`.
  pub async fn update_all_artist_notifications(
    &self,
    favorite_artist_ids: &[String],
    artists: &[Artist],
  ) -> BatchReport {
    if !self.has_permission().await {
      return BatchReport::default();
    }

    let mut report = self.cancel_matching(is_artist_notification).await;
    if favorite_artist_ids.is_empty() {
      return report;
    }

    let Some(timeline) = self.cached_timeline() else {
      warn!("no cached timeline, cannot recompute artist notifications");
      return report;
    };

    for artist_id in favorite_artist_ids {
      let name = artists
        .iter()
        .find(|artist| &artist.id == artist_id)
        .map(|artist| artist.name.as_str())
        .unwrap_or_default();
      report.absorb(self.schedule_artist_events(artist_id, name, &timeline).await);
    }

    info!(
      scheduled = report.scheduled,
      cancelled = report.cancelled,
      skipped = report.skipped,
      failed = report.failures.len(),
      "artist notifications recomputed"
    );
    report
  }
}

fn is_favorite_notification(notification: &ScheduledNotification) -> bool {
  notification.kind() == NotificationKind::FavoriteEvent
    || notification.identifier.starts_with(FAVORITE_EVENT_PREFIX)
}

fn is_artist_notification(notification: &ScheduledNotification) -> bool {
  notification.kind() == NotificationKind::Artist || notification.identifier.starts_with(ARTIST_PREFIX)
}

fn is_artist_notification_of(notification: &ScheduledNotification, artist_id: &str) -> bool {
  notification
    .identifier
    .starts_with(&artist_identifier_prefix(artist_id))
    || (notification.kind() == NotificationKind::Artist
      && notification.payload.artist_id.as_deref() == Some(artist_id))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::clock::ManualClock;
  use crate::platform::MemoryNotificationCenter;
  use serde_json::json;

  fn now() -> DateTime<Utc> {
    "2026-07-03T12:00:00Z".parse().unwrap()
  }

  fn setup(permission: bool) -> (NotificationScheduler, Arc<MemoryNotificationCenter>, CacheStore) {
    let clock = ManualClock::new(now());
    let cache = CacheStore::new(Arc::new(MemoryStorage::new()), Arc::new(clock));
    cache
      .save(
        "timeline",
        &json!([
          {"id": 1, "name": "Opening", "start": "2026-07-03T18:00:00Z", "interpret_id": 7, "stage": "Main"},
          {"id": 2, "name": "Late set", "start": "2026-07-03T23:00:00Z", "interpret_id": 7, "stage": {"name": "Tent"}},
          {"id": 3, "name": "Soon", "start": "2026-07-03T12:08:00Z", "interpret_id": 8},
          {"id": 4, "name": "Other", "start": "2026-07-04T15:00:00Z", "interpret_id": 9},
        ]),
      )
      .unwrap();
    cache.save("artists", &json!([{"id": 7, "name": "Band"}, {"id": 9, "name": "Solo"}])).unwrap();

    let center = Arc::new(MemoryNotificationCenter::new(permission));
    let scheduler = NotificationScheduler::new(center.clone(), cache.clone(), DEFAULT_LEAD_TIME_MINUTES);
    (scheduler, center, cache)
  }

  fn event(start: &str) -> TimelineEvent {
    serde_json::from_value(json!({"id": 1, "name": "Opening", "start": start, "stage": "Main"})).unwrap()
  }

  #[tokio::test]
  async fn test_trigger_is_start_minus_lead_time() {
    let (scheduler, center, _) = setup(true);
    let outcome = scheduler
      .schedule_for_event("1", &event("2026-07-03T18:00:00Z"), Some("Band"))
      .await
      .unwrap();

    let expected: DateTime<Utc> = "2026-07-03T17:50:00Z".parse().unwrap();
    assert_eq!(
      outcome,
      ScheduleOutcome::Scheduled {
        identifier: "favorite_event_1".into(),
        trigger_at: expected,
      }
    );
    let pending = center.get("favorite_event_1").unwrap();
    assert_eq!(pending.title, "Band");
    assert_eq!(pending.body, "Starts in 10 minutes on Main");
    assert_eq!(pending.payload.kind, NotificationKind::FavoriteEvent);
  }

  #[tokio::test]
  async fn test_scheduling_twice_keeps_one_notification() {
    let (scheduler, center, _) = setup(true);
    let e = event("2026-07-03T18:00:00Z");
    scheduler.schedule_for_event("1", &e, None).await.unwrap();
    scheduler.schedule_for_event("1", &e, None).await.unwrap();

    assert_eq!(center.pending().len(), 1);
  }

  #[tokio::test]
  async fn test_past_trigger_is_never_scheduled() {
    let (scheduler, center, _) = setup(true);
    scheduler
      .schedule_for_event("1", &event("2026-07-03T18:00:00Z"), None)
      .await
      .unwrap();

    // The event moved to a slot whose reminder would already have fired
    let outcome = scheduler
      .schedule_for_event("1", &event("2026-07-03T12:08:00Z"), None)
      .await
      .unwrap();
    assert!(matches!(outcome, ScheduleOutcome::TooLate { .. }));
    assert!(center.pending().is_empty());
  }

  #[tokio::test]
  async fn test_safety_offset() {
    let (scheduler, center, _) = setup(true);
    // Trigger lands exactly 5 seconds from now
    let outcome = scheduler
      .schedule_for_event("1", &event("2026-07-03T12:10:05Z"), None)
      .await
      .unwrap();
    assert!(matches!(outcome, ScheduleOutcome::TooLate { .. }));

    let outcome = scheduler
      .schedule_for_event("1", &event("2026-07-03T12:10:06Z"), None)
      .await
      .unwrap();
    assert!(matches!(outcome, ScheduleOutcome::Scheduled { .. }));
    assert_eq!(center.pending().len(), 1);
  }

  #[tokio::test]
  async fn test_unreadable_start() {
    let (scheduler, center, _) = setup(true);
    scheduler
      .schedule_for_event("1", &event("2026-07-03T18:00:00Z"), None)
      .await
      .unwrap();

    let outcome = scheduler.schedule_for_event("1", &event("soon"), None).await.unwrap();
    assert_eq!(outcome, ScheduleOutcome::Unschedulable);
    assert!(center.pending().is_empty());
  }

  #[tokio::test]
  async fn test_lead_time_is_bounded() {
    let (scheduler, center, _) = setup(true);
    assert!(matches!(scheduler.set_lead_time(i64::MAX), Err(Failure::InvalidPayload(_))));
    assert!(scheduler.set_lead_time(MAX_LEAD_TIME_MINUTES + 1).is_err());
    assert_eq!(scheduler.lead_time_minutes(), DEFAULT_LEAD_TIME_MINUTES);
    assert!(scheduler.clone().with_lead_time(i64::MAX).is_err());

    scheduler.set_lead_time(MAX_LEAD_TIME_MINUTES).unwrap();
    let outcome = scheduler
      .schedule_for_event("1", &event("2030-01-01T00:00:00Z"), None)
      .await
      .unwrap();
    let expected: DateTime<Utc> = "2029-12-25T00:00:00Z".parse().unwrap();
    assert!(matches!(outcome, ScheduleOutcome::Scheduled { trigger_at, .. } if trigger_at == expected));
    assert_eq!(center.pending().len(), 1);
  }

  #[tokio::test]
  async fn test_out_of_range_lead_time_is_ignored_on_load() {
    let (_, center, cache) = setup(true);
    cache.set_marker(LEAD_TIME_KEY, &i64::MAX.to_string()).unwrap();

    let scheduler = NotificationScheduler::new(center.clone(), cache, DEFAULT_LEAD_TIME_MINUTES);
    assert_eq!(scheduler.lead_time_minutes(), DEFAULT_LEAD_TIME_MINUTES);
    let outcome = scheduler
      .schedule_for_event("1", &event("2030-01-01T00:00:00Z"), None)
      .await
      .unwrap();
    assert!(matches!(outcome, ScheduleOutcome::Scheduled { .. }));
  }

  #[tokio::test]
  async fn test_no_permission_is_a_noop() {
    let (scheduler, center, _) = setup(false);
    let outcome = scheduler
      .schedule_for_event("1", &event("2026-07-03T18:00:00Z"), None)
      .await
      .unwrap();
    assert_eq!(outcome, ScheduleOutcome::PermissionMissing);

    let report = scheduler.update_all_event_notifications(&["1".to_string()]).await;
    assert_eq!(report, BatchReport::default());
    assert!(center.pending().is_empty());
  }

  #[tokio::test]
  async fn test_cancel_for_event() {
    let (scheduler, center, _) = setup(true);
    scheduler
      .schedule_for_event("1", &event("2026-07-03T18:00:00Z"), None)
      .await
      .unwrap();

    scheduler.cancel_for_event("1").await.unwrap();
    assert!(center.pending().is_empty());
    // Absent notification
    scheduler.cancel_for_event("1").await.unwrap();
  }

  #[tokio::test]
  async fn test_schedule_for_artist_uses_cached_timeline() {
    let (scheduler, center, _) = setup(true);
    let report = scheduler.schedule_for_artist("7", "Band").await;

    assert_eq!(report.scheduled, 2);
    let first = center.get("artist_7_event_1").unwrap();
    assert_eq!(first.payload.kind, NotificationKind::Artist);
    assert_eq!(first.payload.artist_name.as_deref(), Some("Band"));
    assert_eq!(center.get("artist_7_event_2").unwrap().payload.stage.as_deref(), Some("Tent"));

    // Re-deriving replaces instead of duplicating
    scheduler.schedule_for_artist("7", "Band").await;
    assert_eq!(center.pending().len(), 2);
  }

  #[tokio::test]
  async fn test_artist_event_without_id_keys_on_start() {
    let (scheduler, center, cache) = setup(true);
    cache
      .save("timeline", &json!([{"start": "2026-07-03T18:00:00Z", "interpret_id": 7}]))
      .unwrap();

    scheduler.schedule_for_artist("7", "Band").await;
    assert!(center.get("artist_7_event_2026-07-03T18:00:00.000Z").is_some());
  }

  #[tokio::test]
  async fn test_cancel_for_artist_leaves_others() {
    let (scheduler, center, _) = setup(true);
    scheduler.schedule_for_artist("7", "Band").await;
    scheduler.schedule_for_artist("9", "Solo").await;
    scheduler
      .schedule_for_event("4", &event("2026-07-04T15:00:00Z"), None)
      .await
      .unwrap();

    let report = scheduler.cancel_for_artist("7").await;
    assert_eq!(report.cancelled, 2);
    assert!(center.get("artist_9_event_4").is_some());
    assert!(center.get("favorite_event_4").is_some());
  }

  #[tokio::test]
  async fn test_bulk_cancel_continues_past_failures() {
    let (scheduler, center, _) = setup(true);
    scheduler.schedule_for_artist("7", "Band").await;
    scheduler.schedule_for_artist("9", "Solo").await;
    center.fail_cancellation_of("artist_7_event_1");

    let report = scheduler.cancel_all_artist_notifications().await;
    assert_eq!(report.cancelled, 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, "artist_7_event_1");
    assert_eq!(center.pending().len(), 1);
  }

  #[tokio::test]
  async fn test_update_all_events_converges() {
    let (scheduler, center, _) = setup(true);
    scheduler
      .schedule_for_event("2", &event("2026-07-03T23:00:00Z"), None)
      .await
      .unwrap();
    scheduler.schedule_for_artist("9", "Solo").await;

    let favorites = vec!["1".to_string(), "3".to_string(), "99".to_string()];
    let report = scheduler.update_all_event_notifications(&favorites).await;

    assert_eq!(report.cancelled, 1);
    assert_eq!(report.scheduled, 1);
    // Event 3 is too close, event 99 is not on the timeline
    assert_eq!(report.skipped, 2);
    assert!(report.is_clean());

    let event_one = center.get("favorite_event_1").unwrap();
    assert_eq!(event_one.payload.artist_name.as_deref(), Some("Band"));
    assert!(center.get("favorite_event_2").is_none());
    // Artist notifications are a separate class
    assert!(center.get("artist_9_event_4").is_some());
  }

  #[tokio::test]
  async fn test_update_all_artists_converges() {
    let (scheduler, center, cache) = setup(true);
    scheduler.schedule_for_artist("7", "Band").await;
    scheduler
      .schedule_for_event("1", &event("2026-07-03T18:00:00Z"), None)
      .await
      .unwrap();

    let artists = artist_list(&cache.load::<Value>("artists").unwrap());
    let report = scheduler
      .update_all_artist_notifications(&["9".to_string()], &artists)
      .await;

    assert_eq!(report.cancelled, 2);
    assert_eq!(report.scheduled, 1);
    assert_eq!(center.get("artist_9_event_4").unwrap().title, "Solo");
    assert!(center.get("artist_7_event_1").is_none());
    assert!(center.get("favorite_event_1").is_some());
  }

  #[tokio::test]
  async fn test_lead_time_persists() {
    let (scheduler, center, cache) = setup(true);
    scheduler.set_lead_time(30).unwrap();
    assert!(scheduler.set_lead_time(-1).is_err());

    scheduler
      .schedule_for_event("1", &event("2026-07-03T18:00:00Z"), None)
      .await
      .unwrap();
    let expected: DateTime<Utc> = "2026-07-03T17:30:00Z".parse().unwrap();
    assert_eq!(center.get("favorite_event_1").unwrap().trigger_at, expected);

    let reloaded = NotificationScheduler::new(center.clone(), cache, DEFAULT_LEAD_TIME_MINUTES);
    assert_eq!(reloaded.lead_time_minutes(), 30);
  }
}
