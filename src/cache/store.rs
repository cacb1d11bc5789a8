//! Namespaced, TTL-bounded cache over a key-value backend.

use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::entry::{CacheEntry, CacheResult};
use super::storage::KeyValueStorage;
use crate::clock::Clock;
use crate::error::Failure;

/// Prefix applied to every content cache key in the backend.
pub const CACHE_PREFIX: &str = "cache_";

/// Un-prefixed key holding the last-seen app version.
pub const APP_VERSION_KEY: &str = "app_version";

/// Content caches are valid for this many hours.
pub const CACHE_TTL_HOURS: i64 = 24;

/// Cached data younger than this is served without refetching.
pub const REFRESH_AFTER_MINUTES: i64 = 60;

/// Content cache with lazy expiry and version-triggered invalidation.
///
/// Reads never fail: anything that cannot be decoded is deleted and reported
/// as absent.
#[derive(Clone)]
pub struct CacheStore {
  storage: Arc<dyn KeyValueStorage>,
  clock: Arc<dyn Clock>,
  ttl: Duration,
  refresh_after: Duration,
}

impl CacheStore {
  pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>) -> Self {
    Self {
      storage,
      clock,
      ttl: Duration::hours(CACHE_TTL_HOURS),
      refresh_after: Duration::minutes(REFRESH_AFTER_MINUTES),
    }
  }

  fn storage_key(key: &str) -> String {
    format!("{}{}", CACHE_PREFIX, key)
  }

  pub fn now(&self) -> DateTime<Utc> {
    self.clock.now()
  }

  /// Write `data` under `key`, stamped with the current instant.
  ///
  /// The stamp is stored with millisecond precision.
  pub fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<(), Failure> {
    let entry = CacheEntry::new(data, self.clock.now().trunc_subsecs(3));
    let raw = serde_json::to_string(&entry)?;
    self
      .storage
      .set(&Self::storage_key(key), &raw)
      .map_err(Failure::storage)?;
    debug!(key, "cache entry saved");
    Ok(())
  }

  /// Load a valid entry, deleting it first if it is corrupt or expired.
  pub fn load_entry<T: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<T>> {
    let storage_key = Self::storage_key(key);
    let raw = match self.storage.get(&storage_key) {
      Ok(Some(raw)) => raw,
      Ok(None) => return None,
      Err(e) => {
        warn!(key, error = %e, "cache read failed");
        return None;
      }
    };

    let entry = match CacheEntry::<Value>::decode(&raw) {
      Ok(entry) => entry,
      Err(e) => {
        warn!(key, error = %e, "discarding corrupt cache entry");
        self.remove_quietly(&storage_key);
        return None;
      }
    };

    if self.is_expired(entry.timestamp) {
      debug!(key, "cache entry expired");
      self.remove_quietly(&storage_key);
      return None;
    }

    // A sound envelope stays even when this caller expects another shape
    match serde_json::from_value(entry.data) {
      Ok(data) => Some(CacheEntry::new(data, entry.timestamp)),
      Err(e) => {
        debug!(key, error = %e, "cached data does not match the requested type");
        None
      }
    }
  }

  pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
    self.load_entry(key).map(|entry| entry.data)
  }

  pub fn clear(&self, key: &str) -> Result<(), Failure> {
    self
      .storage
      .remove(&Self::storage_key(key))
      .map_err(Failure::storage)
  }

  /// Remove every content cache entry. Markers are left alone.
  pub fn clear_all(&self) -> Result<usize, Failure> {
    let keys = self.storage.keys().map_err(Failure::storage)?;
    let mut removed = 0;
    for key in keys.iter().filter(|k| k.starts_with(CACHE_PREFIX)) {
      self.storage.remove(key).map_err(Failure::storage)?;
      removed += 1;
    }
    info!(removed, "cleared all cache entries");
    Ok(removed)
  }

  pub fn has_valid(&self, key: &str) -> bool {
    self.load_entry::<Value>(key).is_some()
  }

  /// Age of a valid entry.
  pub fn age(&self, key: &str) -> Option<Duration> {
    self
      .load_entry::<Value>(key)
      .map(|entry| self.age_of(entry.timestamp))
  }

  pub fn has_any_valid(&self, keys: &[&str]) -> bool {
    keys.iter().any(|key| self.has_valid(key))
  }

  /// Age of the oldest valid entry among `keys`.
  pub fn oldest_age(&self, keys: &[&str]) -> Option<Duration> {
    keys.iter().filter_map(|key| self.age(key)).max()
  }

  /// Wipe all caches if the app binary changed since the last launch.
  ///
  /// Returns whether a wipe happened. Must run before any other cache read.
  pub fn check_and_clear_on_version_upgrade(&self, current_version: &str) -> bool {
    match self.marker(APP_VERSION_KEY) {
      None => {
        info!(version = current_version, "first launch, recording app version");
        self.record_version(current_version);
        false
      }
      Some(previous) if previous == current_version => false,
      Some(previous) => {
        info!(
          from = %previous,
          to = current_version,
          "app version changed, clearing cache"
        );
        if let Err(e) = self.clear_all() {
          warn!(error = %e, "cache wipe after upgrade failed");
        }
        self.record_version(current_version);
        true
      }
    }
  }

  fn record_version(&self, version: &str) {
    if let Err(e) = self.set_marker(APP_VERSION_KEY, version) {
      warn!(error = %e, "failed to record app version");
    }
  }

  /// Read an un-prefixed marker value. These are not subject to TTL.
  pub fn marker(&self, key: &str) -> Option<String> {
    match self.storage.get(key) {
      Ok(value) => value,
      Err(e) => {
        warn!(key, error = %e, "marker read failed");
        None
      }
    }
  }

  pub fn set_marker(&self, key: &str, value: &str) -> Result<(), Failure> {
    self.storage.set(key, value).map_err(Failure::storage)
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Fresh cache is returned immediately
  /// 2. Stale cache triggers a refetch, falling back to the stale copy
  /// 3. Missing or expired cache must be fetched
  pub async fn fetch_cached<T, F, Fut>(&self, key: &str, fetcher: F) -> Result<CacheResult<T>, Failure>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
  {
    if let Some(cached) = self.load_entry::<T>(key) {
      if self.age_of(cached.timestamp) < self.refresh_after {
        return Ok(CacheResult::from_cache(cached.data, cached.timestamp));
      }

      return match fetcher().await {
        Ok(data) => {
          self.save(key, &data)?;
          Ok(CacheResult::from_network(data))
        }
        Err(e) => {
          debug!(key, error = %e, "refetch failed, serving stale cache");
          Ok(CacheResult::offline(cached.data, cached.timestamp))
        }
      };
    }

    let data = fetcher().await?;
    self.save(key, &data)?;
    Ok(CacheResult::from_network(data))
  }

  fn age_of(&self, timestamp: DateTime<Utc>) -> Duration {
    (self.clock.now() - timestamp).max(Duration::zero())
  }

  fn is_expired(&self, timestamp: DateTime<Utc>) -> bool {
    self.age_of(timestamp) >= self.ttl
  }

  fn remove_quietly(&self, storage_key: &str) {
    if let Err(e) = self.storage.remove(storage_key) {
      warn!(key = storage_key, error = %e, "failed to delete cache entry");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::entry::CacheSource;
  use crate::cache::storage::MemoryStorage;
  use crate::clock::ManualClock;

  fn store() -> (CacheStore, Arc<MemoryStorage>, ManualClock) {
    let storage = Arc::new(MemoryStorage::new());
    let clock = ManualClock::new("2026-07-03T12:00:00Z".parse().unwrap());
    let cache = CacheStore::new(storage.clone(), Arc::new(clock.clone()));
    (cache, storage, clock)
  }

  #[test]
  fn test_load_after_save_within_ttl() {
    let (cache, _, clock) = store();
    cache.save("artists", &vec!["a", "b"]).unwrap();
    clock.advance(Duration::hours(23));

    let loaded: Option<Vec<String>> = cache.load("artists");
    assert_eq!(loaded, Some(vec!["a".to_string(), "b".to_string()]));
  }

  #[test]
  fn test_expired_entry_is_removed() {
    let (cache, storage, clock) = store();
    cache.save("news", &vec![1, 2, 3]).unwrap();
    clock.advance(Duration::hours(24));

    assert_eq!(cache.load::<Vec<u32>>("news"), None);
    assert_eq!(storage.get("cache_news").unwrap(), None);
  }

  #[test]
  fn test_corrupt_entry_is_removed() {
    let (cache, storage, _) = store();
    storage.set("cache_faq", "{not json").unwrap();
    storage.set("cache_news", r#"{"data":null,"timestamp":1}"#).unwrap();

    assert_eq!(cache.load::<Value>("faq"), None);
    assert_eq!(cache.load::<Value>("news"), None);
    assert_eq!(storage.get("cache_faq").unwrap(), None);
    assert_eq!(storage.get("cache_news").unwrap(), None);
  }

  #[test]
  fn test_age_and_oldest_age() {
    let (cache, _, clock) = store();
    cache.save("artists", &1).unwrap();
    clock.advance(Duration::hours(2));
    cache.save("events", &2).unwrap();
    clock.advance(Duration::minutes(30));

    assert_eq!(cache.age("events"), Some(Duration::minutes(30)));
    assert_eq!(
      cache.oldest_age(&["artists", "events", "faq"]),
      Some(Duration::minutes(150))
    );
    assert_eq!(cache.oldest_age(&["faq"]), None);
  }

  #[test]
  fn test_age_is_exact_for_sub_millisecond_clocks() {
    let (cache, _, clock) = store();
    clock.advance(Duration::nanoseconds(939_700));
    cache.save("news", &1).unwrap();
    clock.advance(Duration::minutes(30));

    let age = cache.age("news").unwrap();
    assert!(age >= Duration::minutes(30));
    assert!(age < Duration::minutes(30) + Duration::milliseconds(1));
  }

  #[test]
  fn test_type_mismatch_keeps_entry() {
    let (cache, storage, _) = store();
    cache.save("artists", &vec!["a"]).unwrap();

    assert_eq!(cache.load::<Vec<u32>>("artists"), None);
    assert!(storage.get("cache_artists").unwrap().is_some());
    assert_eq!(cache.load::<Vec<String>>("artists"), Some(vec!["a".to_string()]));
  }

  #[test]
  fn test_has_any_valid() {
    let (cache, _, _) = store();
    assert!(!cache.has_any_valid(&["artists", "news"]));
    cache.save("news", &"x").unwrap();
    assert!(cache.has_any_valid(&["artists", "news"]));
    assert!(!cache.has_valid("artists"));
  }

  #[test]
  fn test_clear_all_keeps_markers() {
    let (cache, storage, _) = store();
    cache.save("artists", &1).unwrap();
    cache.save("events", &2).unwrap();
    cache.set_marker(APP_VERSION_KEY, "1.0.0").unwrap();

    assert_eq!(cache.clear_all().unwrap(), 2);
    assert_eq!(storage.keys().unwrap(), vec![APP_VERSION_KEY.to_string()]);
  }

  #[test]
  fn test_first_launch_records_version_without_wipe() {
    let (cache, _, _) = store();
    cache.save("artists", &1).unwrap();

    assert!(!cache.check_and_clear_on_version_upgrade("1.0.0"));
    assert_eq!(cache.marker(APP_VERSION_KEY).as_deref(), Some("1.0.0"));
    assert!(cache.has_valid("artists"));
  }

  #[test]
  fn test_matching_version_does_not_wipe() {
    let (cache, _, _) = store();
    cache.set_marker(APP_VERSION_KEY, "1.0.0").unwrap();
    cache.save("artists", &1).unwrap();

    assert!(!cache.check_and_clear_on_version_upgrade("1.0.0"));
    assert!(cache.has_valid("artists"));
  }

  #[test]
  fn test_version_change_wipes_once() {
    let (cache, _, _) = store();
    cache.set_marker(APP_VERSION_KEY, "1.0.0").unwrap();
    cache.save("artists", &1).unwrap();

    assert!(cache.check_and_clear_on_version_upgrade("1.1.0"));
    assert!(!cache.has_valid("artists"));
    assert_eq!(cache.marker(APP_VERSION_KEY).as_deref(), Some("1.1.0"));

    cache.save("artists", &1).unwrap();
    assert!(!cache.check_and_clear_on_version_upgrade("1.1.0"));
    assert!(cache.has_valid("artists"));
  }

  #[tokio::test]
  async fn test_fetch_cached_serves_fresh_cache() {
    let (cache, _, _) = store();
    cache.save("news", &vec![1]).unwrap();

    let result = cache
      .fetch_cached("news", || async { Err::<Vec<u32>, _>(Failure::Offline) })
      .await
      .unwrap();
    assert_eq!(result.data, vec![1]);
    assert_eq!(result.source, CacheSource::CacheFresh);
  }

  #[tokio::test]
  async fn test_fetch_cached_refreshes_stale_cache() {
    let (cache, _, clock) = store();
    cache.save("news", &vec![1]).unwrap();
    clock.advance(Duration::hours(2));

    let result = cache
      .fetch_cached("news", || async { Ok(vec![2]) })
      .await
      .unwrap();
    assert_eq!(result.data, vec![2]);
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(cache.load::<Vec<u32>>("news"), Some(vec![2]));
  }

  #[tokio::test]
  async fn test_fetch_cached_falls_back_to_stale_on_failure() {
    let (cache, _, clock) = store();
    cache.save("news", &vec![1]).unwrap();
    clock.advance(Duration::hours(2));

    let result = cache
      .fetch_cached("news", || async {
        Err::<Vec<u32>, _>(Failure::Request("timeout".into()))
      })
      .await
      .unwrap();
    assert_eq!(result.data, vec![1]);
    assert_eq!(result.source, CacheSource::Offline);
  }

  #[tokio::test]
  async fn test_fetch_cached_without_cache_propagates_failure() {
    let (cache, _, _) = store();
    let result = cache
      .fetch_cached("news", || async { Err::<Vec<u32>, _>(Failure::Offline) })
      .await;
    assert_eq!(result.unwrap_err(), Failure::Offline);
  }
}
