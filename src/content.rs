//! Content records as they are stored in the cache.
//!
//! The core treats content as opaque payload. Only the fields needed to
//! compute notification trigger times are typed; everything else rides along
//! in `extra`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// The content types the app caches, one cache key each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
  Artists,
  Events,
  Timeline,
  Partners,
  News,
  Faq,
}

impl ContentKind {
  pub const ALL: [ContentKind; 6] = [
    ContentKind::Artists,
    ContentKind::Events,
    ContentKind::Timeline,
    ContentKind::Partners,
    ContentKind::News,
    ContentKind::Faq,
  ];

  /// Cache key, also used as the API path segment.
  pub fn cache_key(self) -> &'static str {
    match self {
      ContentKind::Artists => "artists",
      ContentKind::Events => "events",
      ContentKind::Timeline => "timeline",
      ContentKind::Partners => "partners",
      ContentKind::News => "news",
      ContentKind::Faq => "faq",
    }
  }
}

impl std::fmt::Display for ContentKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.cache_key())
  }
}

impl std::str::FromStr for ContentKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim().to_lowercase();
    ContentKind::ALL
      .into_iter()
      .find(|kind| kind.cache_key() == s)
      .ok_or_else(|| format!("unknown content type '{}'", s))
  }
}

/// Keys whose presence decides whether the app has usable offline data.
pub const REQUIRED_CONTENT_KEYS: [&str; 5] = ["artists", "events", "partners", "news", "faq"];

/// A performance slot on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
  #[serde(default, deserialize_with = "opt_string_or_number")]
  pub id: Option<String>,
  #[serde(default, alias = "title")]
  pub name: Option<String>,
  pub start: String,
  #[serde(default)]
  pub end: Option<String>,
  #[serde(default, deserialize_with = "opt_string_or_number")]
  pub interpret_id: Option<String>,
  /// Either a plain stage name or a stage descriptor object
  #[serde(default)]
  pub stage: Option<Value>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl TimelineEvent {
  pub fn start_time(&self) -> Option<DateTime<Utc>> {
    parse_event_time(&self.start)
  }

  pub fn stage_name(&self) -> Option<String> {
    match self.stage.as_ref()? {
      Value::String(name) => Some(name.clone()),
      Value::Object(stage) => stage
        .get("name")
        .or_else(|| stage.get("label"))
        .and_then(value_to_string),
      _ => None,
    }
  }
}

/// An artist as listed in the lineup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
  #[serde(deserialize_with = "string_or_number")]
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

/// Decode a cached timeline payload, skipping records that do not parse.
///
/// Accepts either a bare array or an object wrapping it in `events`.
pub fn timeline_events(payload: &Value) -> Vec<TimelineEvent> {
  decode_records(payload, "events")
}

/// Decode a cached artist list, skipping records that do not parse.
pub fn artist_list(payload: &Value) -> Vec<Artist> {
  decode_records(payload, "artists")
}

fn decode_records<T: for<'de> Deserialize<'de>>(payload: &Value, wrapper: &str) -> Vec<T> {
  let items = match payload {
    Value::Array(items) => items,
    Value::Object(object) => match object.get(wrapper) {
      Some(Value::Array(items)) => items,
      _ => return Vec::new(),
    },
    _ => return Vec::new(),
  };

  items
    .iter()
    .filter_map(|item| match T::deserialize(item) {
      Ok(record) => Some(record),
      Err(e) => {
        debug!(error = %e, "skipping malformed content record");
        None
      }
    })
    .collect()
}

/// Parse a start/end time. Times without an offset are taken as UTC.
pub fn parse_event_time(s: &str) -> Option<DateTime<Utc>> {
  let s = s.trim();
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.with_timezone(&Utc));
  }

  ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .map(|dt| dt.and_utc())
}

/// Render a scalar JSON value as a string. Objects, arrays and null yield None.
pub fn value_to_string(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

fn opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Option::<Value>::deserialize(deserializer)?;
  Ok(value.as_ref().and_then(value_to_string))
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
  D: Deserializer<'de>,
{
  let value = Value::deserialize(deserializer)?;
  value_to_string(&value).ok_or_else(|| serde::de::Error::custom("expected a string or number id"))
}
