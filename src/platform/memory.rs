//! In-process collaborators for dry runs, fixture-driven launches and tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use super::{
  config_bool, config_string, ContentFetcher, NavigationSurface, NetworkProbe, NotificationCenter,
  RemoteConfigClient,
};
use crate::content::ContentKind;
use crate::error::Failure;
use crate::navigation::Route;
use crate::notifications::ScheduledNotification;

/// Probe with a settable answer.
#[derive(Debug)]
pub struct FixedProbe {
  online: AtomicBool,
}

impl FixedProbe {
  pub fn new(online: bool) -> Self {
    Self {
      online: AtomicBool::new(online),
    }
  }

  pub fn set_online(&self, online: bool) {
    self.online.store(online, Ordering::SeqCst);
  }
}

#[async_trait]
impl NetworkProbe for FixedProbe {
  async fn is_online(&self) -> bool {
    self.online.load(Ordering::SeqCst)
  }
}

/// Remote config that serves a fixed map.
#[derive(Debug, Default)]
pub struct StaticRemoteConfig {
  values: HashMap<String, Value>,
  fail_init: bool,
}

impl StaticRemoteConfig {
  pub fn new(values: HashMap<String, Value>) -> Self {
    Self {
      values,
      fail_init: false,
    }
  }

  /// Make `initialize` fail while still serving the values.
  pub fn failing(mut self) -> Self {
    self.fail_init = true;
    self
  }
}

#[async_trait]
impl RemoteConfigClient for StaticRemoteConfig {
  async fn initialize(&self, _fetch_remote: bool) -> Result<(), Failure> {
    if self.fail_init {
      return Err(Failure::Request("remote config unavailable".to_string()));
    }
    Ok(())
  }

  fn get_string(&self, key: &str) -> Option<String> {
    config_string(self.values.get(key))
  }

  fn get_bool(&self, key: &str) -> Option<bool> {
    config_bool(self.values.get(key))
  }
}

/// Fetcher that answers from a fixed table of payloads.
///
/// Kinds missing from the table fail with a request error.
#[derive(Debug, Default)]
pub struct StaticContentFetcher {
  payloads: RwLock<HashMap<ContentKind, Value>>,
  calls: AtomicUsize,
}

impl StaticContentFetcher {
  pub fn new(payloads: HashMap<ContentKind, Value>) -> Self {
    Self {
      payloads: RwLock::new(payloads),
      calls: AtomicUsize::new(0),
    }
  }

  /// Build from a JSON object keyed by content kind, e.g. a fixture file.
  pub fn from_object(object: &serde_json::Map<String, Value>) -> Self {
    let payloads = ContentKind::ALL
      .iter()
      .filter_map(|kind| object.get(kind.cache_key()).map(|v| (*kind, v.clone())))
      .collect();
    Self::new(payloads)
  }

  pub fn set(&self, kind: ContentKind, payload: Value) {
    self
      .payloads
      .write()
      .unwrap_or_else(|e| e.into_inner())
      .insert(kind, payload);
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl ContentFetcher for StaticContentFetcher {
  async fn fetch(&self, kind: ContentKind) -> Result<Value, Failure> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self
      .payloads
      .read()
      .unwrap_or_else(|e| e.into_inner())
      .get(&kind)
      .cloned()
      .ok_or_else(|| Failure::Request(format!("no payload for {}", kind)))
  }
}

/// Notification center that keeps pending notifications in memory, keyed by
/// identifier.
#[derive(Debug)]
pub struct MemoryNotificationCenter {
  permission: AtomicBool,
  pending: Mutex<BTreeMap<String, ScheduledNotification>>,
  failing_cancels: Mutex<HashSet<String>>,
  listeners_registered: AtomicUsize,
}

impl MemoryNotificationCenter {
  pub fn new(permission: bool) -> Self {
    Self {
      permission: AtomicBool::new(permission),
      pending: Mutex::new(BTreeMap::new()),
      failing_cancels: Mutex::new(HashSet::new()),
      listeners_registered: AtomicUsize::new(0),
    }
  }

  pub fn set_permission(&self, granted: bool) {
    self.permission.store(granted, Ordering::SeqCst);
  }

  /// Make cancelling `identifier` fail.
  pub fn fail_cancellation_of(&self, identifier: &str) {
    self
      .failing_cancels
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .insert(identifier.to_string());
  }

  pub fn pending(&self) -> Vec<ScheduledNotification> {
    self
      .pending
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .values()
      .cloned()
      .collect()
  }

  pub fn get(&self, identifier: &str) -> Option<ScheduledNotification> {
    self
      .pending
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .get(identifier)
      .cloned()
  }

  pub fn listener_registrations(&self) -> usize {
    self.listeners_registered.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl NotificationCenter for MemoryNotificationCenter {
  async fn permission_granted(&self) -> bool {
    self.permission.load(Ordering::SeqCst)
  }

  async fn schedule(&self, notification: ScheduledNotification) -> Result<(), Failure> {
    self
      .pending
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .insert(notification.identifier.clone(), notification);
    Ok(())
  }

  async fn cancel(&self, identifier: &str) -> Result<(), Failure> {
    let failing = self
      .failing_cancels
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .contains(identifier);
    if failing {
      return Err(Failure::Notification(format!("cannot cancel {}", identifier)));
    }
    self
      .pending
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .remove(identifier);
    Ok(())
  }

  async fn scheduled(&self) -> Result<Vec<ScheduledNotification>, Failure> {
    Ok(self.pending())
  }

  async fn register_listeners(&self) -> Result<(), Failure> {
    self.listeners_registered.fetch_add(1, Ordering::SeqCst);
    Ok(())
  }
}

/// Navigation surface that records every route it is asked to show.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
  attached: AtomicBool,
  routes: Mutex<Vec<Route>>,
  reject: Mutex<Option<crate::navigation::Screen>>,
}

impl RecordingNavigator {
  pub fn new(attached: bool) -> Self {
    Self {
      attached: AtomicBool::new(attached),
      ..Self::default()
    }
  }

  pub fn attach(&self) {
    self.attached.store(true, Ordering::SeqCst);
  }

  /// Fail every navigation to `screen`.
  pub fn reject_screen(&self, screen: crate::navigation::Screen) {
    *self.reject.lock().unwrap_or_else(|e| e.into_inner()) = Some(screen);
  }

  pub fn routes(&self) -> Vec<Route> {
    self.routes.lock().unwrap_or_else(|e| e.into_inner()).clone()
  }
}

impl NavigationSurface for RecordingNavigator {
  fn is_attached(&self) -> bool {
    self.attached.load(Ordering::SeqCst)
  }

  fn navigate(&self, route: &Route) -> Result<(), Failure> {
    if !self.is_attached() {
      return Err(Failure::Navigation("navigator not attached".to_string()));
    }

    let screen = match route {
      Route::Direct { screen, .. } | Route::Nested { screen, .. } => *screen,
    };
    if *self.reject.lock().unwrap_or_else(|e| e.into_inner()) == Some(screen) {
      return Err(Failure::Navigation(format!("{:?} is unavailable", screen)));
    }

    self
      .routes
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .push(route.clone());
    Ok(())
  }
}
