//! Startup sequence: version wipe, connectivity, remote config, update gate,
//! preload, and the final readiness decision.

use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::preload::{PreloadProgress, Preloader};
use super::state::{decide_outcome, BootstrapEvent, BootstrapState, Outcome};
use crate::cache::CacheStore;
use crate::content::{timeline_events, ContentKind, TimelineEvent, REQUIRED_CONTENT_KEYS};
use crate::error::Failure;
use crate::platform::{ContentFetcher, NetworkProbe, NotificationCenter, RemoteConfigClient};
use crate::update::{UpdateGate, UpdateKind};

/// Marker holding the version the user chose to postpone.
pub const SKIPPED_VERSION_KEY: &str = "skipped_update_version";

/// Collaborators the coordinator drives.
pub struct BootstrapDeps {
  pub cache: CacheStore,
  pub probe: Arc<dyn NetworkProbe>,
  pub remote: Arc<dyn RemoteConfigClient>,
  pub fetcher: Arc<dyn ContentFetcher>,
  /// Listener registration target, if notifications are wired up
  pub notifications: Option<Arc<dyn NotificationCenter>>,
  pub app_version: String,
}

/// Where a new attempt enters the sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
  /// Full sequence from the version check
  Launch,
  /// Straight to the update gate, after the user skipped an update
  AfterSkip,
}

struct Attempt {
  id: u64,
  cancel: CancellationToken,
}

struct Inner {
  cache: CacheStore,
  probe: Arc<dyn NetworkProbe>,
  remote: Arc<dyn RemoteConfigClient>,
  gate: UpdateGate,
  preloader: Preloader,
  notifications: Option<Arc<dyn NotificationCenter>>,
  state_tx: watch::Sender<BootstrapState>,
  attempt: Mutex<Attempt>,
  timeline: RwLock<Option<Vec<TimelineEvent>>>,
}

/// Drives the startup state machine.
///
/// Each `start`/`retry`/`skip_update` begins a new attempt and cancels the one
/// in flight. Transitions from a superseded attempt are discarded.
#[derive(Clone)]
pub struct BootstrapCoordinator {
  inner: Arc<Inner>,
}

impl BootstrapCoordinator {
  pub fn new(deps: BootstrapDeps) -> Self {
    let gate = UpdateGate::new(deps.app_version, Arc::clone(&deps.remote));
    let preloader = Preloader::new(deps.fetcher, deps.cache.clone());
    let (state_tx, _) = watch::channel(BootstrapState::Loading);

    Self {
      inner: Arc::new(Inner {
        cache: deps.cache,
        probe: deps.probe,
        remote: deps.remote,
        gate,
        preloader,
        notifications: deps.notifications,
        state_tx,
        attempt: Mutex::new(Attempt {
          id: 0,
          cancel: CancellationToken::new(),
        }),
        timeline: RwLock::new(None),
      }),
    }
  }

  /// Receive every state change.
  pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
    self.inner.state_tx.subscribe()
  }

  pub fn state(&self) -> BootstrapState {
    self.inner.state_tx.borrow().clone()
  }

  pub fn progress(&self) -> PreloadProgress {
    self.inner.preloader.progress()
  }

  /// Timeline read from cache during the last attempt.
  pub fn cached_timeline(&self) -> Option<Vec<TimelineEvent>> {
    self
      .inner
      .timeline
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .clone()
  }

  /// Run the startup sequence. Always lands on a state other than loading
  /// unless a newer attempt superseded this one.
  pub async fn start(&self) -> BootstrapState {
    self.run(Entry::Launch, BootstrapEvent::Begin).await
  }

  /// Replay the whole sequence with a fresh attempt.
  pub async fn retry(&self) -> BootstrapState {
    info!("bootstrap retry requested");
    self.run(Entry::Launch, BootstrapEvent::Begin).await
  }

  /// Postpone the advertised optional update and continue startup.
  pub async fn skip_update(&self) -> BootstrapState {
    let update = match self.state() {
      BootstrapState::UpdateOptional { update } => update,
      state => {
        warn!(%state, "skip requested without an optional update");
        return state;
      }
    };

    if let Err(e) = self
      .inner
      .cache
      .set_marker(SKIPPED_VERSION_KEY, &update.latest_version)
    {
      warn!(error = %e, "failed to persist skipped version");
    }
    info!(version = %update.latest_version, "optional update skipped");

    self.run(Entry::AfterSkip, BootstrapEvent::SkipUpdate).await
  }

  /// Auto-retry when connectivity returns while blocked.
  pub async fn on_connectivity_change(&self, online: bool) -> Option<BootstrapState> {
    if online && self.state() == BootstrapState::OfflineBlocked {
      info!("connectivity regained while blocked, retrying");
      return Some(self.retry().await);
    }
    None
  }

  async fn run(&self, entry: Entry, begin: BootstrapEvent) -> BootstrapState {
    let Some((id, cancel)) = self.inner.begin_attempt(begin) else {
      return self.state();
    };

    let inner = Arc::clone(&self.inner);
    let handle = tokio::spawn(async move { inner.sequence(entry, &cancel).await });

    let event = match handle.await {
      Ok(Ok(event)) => event,
      Ok(Err(Failure::Cancelled)) => {
        debug!(attempt = id, "bootstrap attempt superseded");
        return self.state();
      }
      Ok(Err(e)) => {
        warn!(attempt = id, error = %e, "bootstrap failed, falling back to cache");
        self.inner.fallback()
      }
      Err(e) => {
        error!(attempt = id, error = %e, "bootstrap task aborted, falling back to cache");
        self.inner.fallback()
      }
    };

    self.inner.settle(id, event);
    self.state()
  }
}

/// Await `fut` unless the attempt is cancelled first.
async fn guard<F: Future>(cancel: &CancellationToken, fut: F) -> Result<F::Output, Failure> {
  tokio::select! {
    biased;
    _ = cancel.cancelled() => Err(Failure::Cancelled),
    out = fut => Ok(out),
  }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), Failure> {
  if cancel.is_cancelled() {
    Err(Failure::Cancelled)
  } else {
    Ok(())
  }
}

impl Inner {
  /// Invalidate the in-flight attempt and enter loading.
  fn begin_attempt(&self, begin: BootstrapEvent) -> Option<(u64, CancellationToken)> {
    let mut attempt = self.attempt.lock().unwrap_or_else(|e| e.into_inner());

    let current = self.state_tx.borrow().clone();
    let Some(next) = current.apply(begin.clone()) else {
      warn!(state = %current, event = ?begin, "ignoring illegal bootstrap transition");
      return None;
    };

    attempt.cancel.cancel();
    attempt.id += 1;
    attempt.cancel = CancellationToken::new();
    self.state_tx.send_replace(next);

    debug!(attempt = attempt.id, "bootstrap attempt started");
    Some((attempt.id, attempt.cancel.clone()))
  }

  /// Apply the attempt's final event if it is still the current attempt.
  fn settle(&self, id: u64, event: BootstrapEvent) {
    let attempt = self.attempt.lock().unwrap_or_else(|e| e.into_inner());
    if attempt.id != id {
      debug!(attempt = id, current = attempt.id, "discarding result of stale attempt");
      return;
    }

    let current = self.state_tx.borrow().clone();
    match current.apply(event.clone()) {
      Some(next) => {
        info!(attempt = id, from = %current, to = %next, "bootstrap state changed");
        self.state_tx.send_replace(next);
      }
      None => warn!(state = %current, event = ?event, "ignoring illegal bootstrap transition"),
    }
  }

  fn fallback(&self) -> BootstrapEvent {
    let outcome = if self.cache.has_any_valid(&REQUIRED_CONTENT_KEYS) {
      Outcome::ReadyOffline
    } else {
      Outcome::OfflineBlocked
    };
    BootstrapEvent::Settled(outcome)
  }

  fn is_skipped(&self, version: &str) -> bool {
    self.cache.marker(SKIPPED_VERSION_KEY).as_deref() == Some(version)
  }

  fn load_cached_timeline(&self) {
    let events = self
      .cache
      .load::<Value>(ContentKind::Timeline.cache_key())
      .map(|payload| timeline_events(&payload));
    debug!(events = events.as_ref().map(Vec::len), "cached timeline loaded");
    *self.timeline.write().unwrap_or_else(|e| e.into_inner()) = events;
  }

  fn register_listeners(&self) {
    let Some(center) = self.notifications.clone() else {
      return;
    };
    tokio::spawn(async move {
      if let Err(e) = center.register_listeners().await {
        warn!(error = %e, "failed to register notification listeners");
      }
    });
  }

  async fn sequence(&self, entry: Entry, cancel: &CancellationToken) -> Result<BootstrapEvent, Failure> {
    if entry == Entry::Launch {
      checkpoint(cancel)?;
      if self
        .cache
        .check_and_clear_on_version_upgrade(self.gate.current_version())
      {
        info!("cache cleared after app upgrade");
      }
    }

    let online = guard(cancel, self.probe.is_online()).await?;
    info!(online, "connectivity probed");

    if entry == Entry::Launch {
      // Offline initialization only loads defaults, so it cannot block
      if let Err(e) = guard(cancel, self.remote.initialize(online)).await? {
        warn!(error = %e, "remote config unavailable, using defaults");
      }
    }

    checkpoint(cancel)?;
    if online {
      let update = self.gate.check(true);
      match update.kind {
        UpdateKind::Forced => return Ok(BootstrapEvent::UpdateForced(update)),
        UpdateKind::Optional if !self.is_skipped(&update.latest_version) => {
          return Ok(BootstrapEvent::UpdateAvailable(update));
        }
        UpdateKind::Optional => {
          debug!(version = %update.latest_version, "optional update previously skipped")
        }
        UpdateKind::None => {}
      }
    }

    self.register_listeners();

    let had_cache = self.cache.has_any_valid(&REQUIRED_CONTENT_KEYS);
    if had_cache {
      self.load_cached_timeline();
    }

    let outcome = if online {
      let report = guard(cancel, self.preloader.preload(&ContentKind::ALL)).await?;
      let has_cache_now = self.cache.has_any_valid(&REQUIRED_CONTENT_KEYS);
      if has_cache_now {
        self.load_cached_timeline();
      }
      decide_outcome(true, report.is_complete(), had_cache, has_cache_now)
    } else {
      decide_outcome(false, false, had_cache, had_cache)
    };

    Ok(BootstrapEvent::Settled(outcome))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{MemoryStorage, APP_VERSION_KEY};
  use crate::clock::SystemClock;
  use crate::platform::{FixedProbe, MemoryNotificationCenter, StaticContentFetcher, StaticRemoteConfig};
  use crate::update::{FORCE_UPDATE_KEY, LATEST_VERSION_KEY, MIN_REQUIRED_VERSION_KEY};
  use async_trait::async_trait;
  use serde_json::json;
  use std::collections::HashMap;

  struct Harness {
    cache: CacheStore,
    probe: Arc<FixedProbe>,
    fetcher: Arc<StaticContentFetcher>,
    center: Arc<MemoryNotificationCenter>,
  }

  impl Harness {
    fn new(online: bool) -> Self {
      let cache = CacheStore::new(Arc::new(MemoryStorage::new()), Arc::new(SystemClock));
      cache.set_marker(APP_VERSION_KEY, "1.0.0").unwrap();
      Self {
        cache,
        probe: Arc::new(FixedProbe::new(online)),
        fetcher: Arc::new(StaticContentFetcher::default()),
        center: Arc::new(MemoryNotificationCenter::new(true)),
      }
    }

    fn serve_everything(&self) {
      for kind in ContentKind::ALL {
        self.fetcher.set(kind, json!([]));
      }
    }

    fn coordinator(&self) -> BootstrapCoordinator {
      self.coordinator_with(StaticRemoteConfig::default(), self.fetcher.clone())
    }

    fn coordinator_with(
      &self,
      remote: StaticRemoteConfig,
      fetcher: Arc<dyn ContentFetcher>,
    ) -> BootstrapCoordinator {
      BootstrapCoordinator::new(BootstrapDeps {
        cache: self.cache.clone(),
        probe: self.probe.clone(),
        remote: Arc::new(remote),
        fetcher,
        notifications: Some(self.center.clone()),
        app_version: "1.0.0".to_string(),
      })
    }
  }

  fn update_config(min: &str, latest: &str, force: bool) -> StaticRemoteConfig {
    let mut values = HashMap::new();
    values.insert(MIN_REQUIRED_VERSION_KEY.to_string(), json!(min));
    values.insert(LATEST_VERSION_KEY.to_string(), json!(latest));
    values.insert(FORCE_UPDATE_KEY.to_string(), json!(force));
    StaticRemoteConfig::new(values)
  }

  /// Fetcher whose calls never complete.
  struct HangingFetcher;

  #[async_trait]
  impl ContentFetcher for HangingFetcher {
    async fn fetch(&self, _kind: ContentKind) -> Result<Value, Failure> {
      std::future::pending().await
    }
  }

  /// Probe that panics inside the attempt task.
  struct PanickingProbe;

  #[async_trait]
  impl NetworkProbe for PanickingProbe {
    async fn is_online(&self) -> bool {
      panic!("probe crashed")
    }
  }

  fn crashing_coordinator(h: &Harness) -> BootstrapCoordinator {
    BootstrapCoordinator::new(BootstrapDeps {
      cache: h.cache.clone(),
      probe: Arc::new(PanickingProbe),
      remote: Arc::new(StaticRemoteConfig::default()),
      fetcher: h.fetcher.clone(),
      notifications: Some(h.center.clone()),
      app_version: "1.0.0".to_string(),
    })
  }

  #[tokio::test]
  async fn test_crash_falls_back_to_cache() {
    let h = Harness::new(true);
    h.cache.save("news", &json!([])).unwrap();
    let coordinator = crashing_coordinator(&h);

    assert_eq!(coordinator.start().await, BootstrapState::ReadyOffline);
    assert_eq!(coordinator.state(), BootstrapState::ReadyOffline);
  }

  #[tokio::test]
  async fn test_crash_without_cache_blocks() {
    let h = Harness::new(true);
    let coordinator = crashing_coordinator(&h);

    assert_eq!(coordinator.start().await, BootstrapState::OfflineBlocked);
    assert_eq!(coordinator.retry().await, BootstrapState::OfflineBlocked);
  }

  #[tokio::test]
  async fn test_online_preload_succeeds() {
    let h = Harness::new(true);
    h.serve_everything();
    let coordinator = h.coordinator();

    assert_eq!(coordinator.start().await, BootstrapState::ReadyOnline);
    assert_eq!(coordinator.progress(), PreloadProgress { completed: 6, total: 6 });
    assert!(h.cache.has_valid("faq"));
  }

  #[tokio::test]
  async fn test_online_preload_fails_with_prior_cache() {
    let h = Harness::new(true);
    h.cache.save("artists", &json!([])).unwrap();

    assert_eq!(h.coordinator().start().await, BootstrapState::ReadyOffline);
  }

  #[tokio::test]
  async fn test_online_preload_fails_without_cache() {
    let h = Harness::new(true);
    assert_eq!(h.coordinator().start().await, BootstrapState::OfflineBlocked);
  }

  #[tokio::test]
  async fn test_offline_with_cache() {
    let h = Harness::new(false);
    h.serve_everything();
    h.cache.save("news", &json!([])).unwrap();
    h.cache
      .save("timeline", &json!([{"id": 1, "start": "2026-07-03T18:00:00Z"}]))
      .unwrap();
    let coordinator = h.coordinator();

    assert_eq!(coordinator.start().await, BootstrapState::ReadyOffline);
    assert_eq!(h.fetcher.calls(), 0);
    assert_eq!(coordinator.cached_timeline().map(|t| t.len()), Some(1));
  }

  #[tokio::test]
  async fn test_offline_without_cache_then_connectivity_regained() {
    let h = Harness::new(false);
    h.serve_everything();
    let coordinator = h.coordinator();

    assert_eq!(coordinator.start().await, BootstrapState::OfflineBlocked);
    assert_eq!(coordinator.on_connectivity_change(false).await, None);

    h.probe.set_online(true);
    assert_eq!(
      coordinator.on_connectivity_change(true).await,
      Some(BootstrapState::ReadyOnline)
    );
    // Only a blocked app retries on its own
    assert_eq!(coordinator.on_connectivity_change(true).await, None);
  }

  #[tokio::test]
  async fn test_forced_update_stops_bootstrap() {
    let h = Harness::new(true);
    h.serve_everything();
    let coordinator = h.coordinator_with(update_config("1.1.0", "1.2.0", true), h.fetcher.clone());

    let state = coordinator.start().await;
    assert!(matches!(state, BootstrapState::UpdateRequired { ref update } if update.latest_version == "1.2.0"));
    assert_eq!(h.fetcher.calls(), 0);

    // A forced update cannot be skipped
    assert!(matches!(coordinator.skip_update().await, BootstrapState::UpdateRequired { .. }));
  }

  #[tokio::test]
  async fn test_optional_update_can_be_skipped() {
    let h = Harness::new(true);
    h.serve_everything();
    let coordinator = h.coordinator_with(update_config("1.0.0", "1.2.0", false), h.fetcher.clone());

    assert!(matches!(coordinator.start().await, BootstrapState::UpdateOptional { .. }));
    assert_eq!(coordinator.skip_update().await, BootstrapState::ReadyOnline);
    assert_eq!(h.cache.marker(SKIPPED_VERSION_KEY).as_deref(), Some("1.2.0"));

    // The same version stays skipped on later launches
    assert_eq!(coordinator.retry().await, BootstrapState::ReadyOnline);
  }

  #[tokio::test]
  async fn test_newer_version_is_offered_again_after_skip() {
    let h = Harness::new(true);
    h.serve_everything();
    h.cache.set_marker(SKIPPED_VERSION_KEY, "1.1.0").unwrap();
    let coordinator = h.coordinator_with(update_config("1.0.0", "1.2.0", false), h.fetcher.clone());

    assert!(matches!(coordinator.start().await, BootstrapState::UpdateOptional { .. }));
  }

  #[tokio::test]
  async fn test_version_upgrade_wipes_cache_before_reads() {
    let h = Harness::new(false);
    h.cache.set_marker(APP_VERSION_KEY, "0.9.0").unwrap();
    h.cache.save("artists", &json!([])).unwrap();

    assert_eq!(h.coordinator().start().await, BootstrapState::OfflineBlocked);
    assert_eq!(h.cache.marker(APP_VERSION_KEY).as_deref(), Some("1.0.0"));
  }

  #[tokio::test]
  async fn test_remote_config_failure_is_not_fatal() {
    let h = Harness::new(true);
    h.serve_everything();
    let coordinator = h.coordinator_with(StaticRemoteConfig::default().failing(), h.fetcher.clone());

    assert_eq!(coordinator.start().await, BootstrapState::ReadyOnline);
  }

  #[tokio::test]
  async fn test_listeners_registered() {
    let h = Harness::new(false);
    h.coordinator().start().await;

    for _ in 0..10 {
      if h.center.listener_registrations() > 0 {
        break;
      }
      tokio::task::yield_now().await;
    }
    assert_eq!(h.center.listener_registrations(), 1);
  }

  #[tokio::test]
  async fn test_stale_attempt_cannot_overwrite_newer_state() {
    let h = Harness::new(true);
    h.cache.save("artists", &json!([])).unwrap();
    let coordinator = h.coordinator_with(StaticRemoteConfig::default(), Arc::new(HangingFetcher));

    let first = {
      let coordinator = coordinator.clone();
      tokio::spawn(async move { coordinator.start().await })
    };
    while coordinator.progress().total == 0 {
      tokio::task::yield_now().await;
    }

    h.probe.set_online(false);
    assert_eq!(coordinator.retry().await, BootstrapState::ReadyOffline);

    // The superseded attempt returns without publishing anything of its own
    first.await.unwrap();
    assert_eq!(coordinator.state(), BootstrapState::ReadyOffline);
  }

  #[tokio::test]
  async fn test_subscribers_see_transitions() {
    let h = Harness::new(false);
    let coordinator = h.coordinator();
    let mut rx = coordinator.subscribe();

    coordinator.start().await;
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow_and_update(), BootstrapState::OfflineBlocked);
  }
}
