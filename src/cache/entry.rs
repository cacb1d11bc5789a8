//! Stored cache envelope and lookup results.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Failure;

/// A cached payload together with the instant it was written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
  pub data: T,
  #[serde(with = "chrono::serde::ts_milliseconds")]
  pub timestamp: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
  pub fn new(data: T, timestamp: DateTime<Utc>) -> Self {
    Self { data, timestamp }
  }
}

impl<T: DeserializeOwned> CacheEntry<T> {
  /// Decode a stored envelope.
  ///
  /// Rejects anything that is not an object with a non-null `data` field and a
  /// numeric `timestamp`, so the caller can delete it.
  pub fn decode(raw: &str) -> Result<Self, Failure> {
    let value: Value = serde_json::from_str(raw)?;
    let object = value
      .as_object()
      .ok_or_else(|| Failure::InvalidPayload("cache entry is not an object".to_string()))?;

    match object.get("data") {
      None | Some(Value::Null) => {
        return Err(Failure::InvalidPayload("cache entry has no data".to_string()));
      }
      Some(_) => {}
    }
    if !object.get("timestamp").is_some_and(Value::is_i64) {
      return Err(Failure::InvalidPayload(
        "cache entry has no timestamp".to_string(),
      ));
    }

    Ok(serde_json::from_value(value)?)
  }
}

/// Result from a cache-first fetch, including where the data came from.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  pub data: T,
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::CacheFresh,
      cached_at: Some(cached_at),
    }
  }

  /// Stale cached data served because the refetch failed.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Stale cache served because the network fetch failed
  Offline,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_decode_valid_entry() {
    let entry: CacheEntry<Vec<u32>> =
      CacheEntry::decode(r#"{"data":[1,2],"timestamp":1700000000000}"#).unwrap();
    assert_eq!(entry.data, vec![1, 2]);
    assert_eq!(entry.timestamp.timestamp_millis(), 1_700_000_000_000);
  }

  #[test]
  fn test_decode_rejects_null_data() {
    let result = CacheEntry::<Value>::decode(r#"{"data":null,"timestamp":1}"#);
    assert!(matches!(result, Err(Failure::InvalidPayload(_))));
  }

  #[test]
  fn test_decode_rejects_missing_timestamp() {
    let result = CacheEntry::<Value>::decode(r#"{"data":[1]}"#);
    assert!(result.is_err());
  }

  #[test]
  fn test_decode_rejects_garbage() {
    assert!(CacheEntry::<Value>::decode("not json {").is_err());
    assert!(CacheEntry::<Value>::decode("[1,2,3]").is_err());
  }

  #[test]
  fn test_decode_rejects_wrong_data_shape() {
    let result = CacheEntry::<Vec<u32>>::decode(r#"{"data":"text","timestamp":1}"#);
    assert!(result.is_err());
  }
}
