use percent_encoding::percent_decode_str;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use super::queue::{Dispatch, NavigationQueue};
use super::routes::{lookup_static, sanitize, NavigationIntent, Params, Screen};
use crate::content::value_to_string;
use crate::notifications::NotificationKind;

/// Notification data keys that carry a link to open instead of typed fields.
const LINK_KEYS: &[&str] = &["url", "link", "deepLink"];

/// Turns URIs and notification data into validated navigation intents.
///
/// Anything unrecognized or malformed becomes the home intent.
#[derive(Clone)]
pub struct DeepLinkResolver {
  queue: NavigationQueue,
  scheme: String,
  hosts: Vec<String>,
}

impl DeepLinkResolver {
  /// `scheme` is the app's custom URI scheme; `hosts` are the web hosts
  /// whose links the app claims.
  pub fn new(queue: NavigationQueue, scheme: impl Into<String>, hosts: Vec<String>) -> Self {
    Self {
      queue,
      scheme: scheme.into().to_lowercase(),
      hosts: hosts.into_iter().map(|h| h.to_lowercase()).collect(),
    }
  }

  /// Resolve a URI such as `festival://artist/12` or
  /// `https://<host>/news/3`. Scheme-less paths are accepted too.
  pub fn resolve_uri(&self, uri: &str) -> NavigationIntent {
    let uri = uri.trim();
    let (segments, query) = if uri.contains("://") {
      match Url::parse(uri) {
        Ok(url) => match self.segments_of(&url) {
          Some(segments) => (segments, query_params(&url)),
          None => {
            warn!(uri, "deep link from unclaimed scheme or host");
            return NavigationIntent::home();
          }
        },
        Err(e) => {
          warn!(uri, error = %e, "malformed deep link");
          return NavigationIntent::home();
        }
      }
    } else {
      let (path, query) = uri.split_once('?').unwrap_or((uri, ""));
      let query = url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
      (split_path(path), query)
    };

    let intent = match_path(&segments, query);
    self.validated(intent)
  }

  fn segments_of(&self, url: &Url) -> Option<Vec<String>> {
    let scheme = url.scheme().to_lowercase();
    let mut segments = Vec::new();

    if scheme == self.scheme {
      // For custom schemes the first path component parses as the host
      if let Some(host) = url.host_str() {
        segments.extend(split_path(host));
      }
    } else if scheme == "http" || scheme == "https" {
      let host = url.host_str()?.to_lowercase();
      if !self.hosts.contains(&host) {
        return None;
      }
    } else {
      return None;
    }

    segments.extend(split_path(url.path()));
    Some(segments)
  }

  /// Resolve a tapped notification's data.
  pub fn resolve_notification(&self, data: &Map<String, Value>) -> NavigationIntent {
    if let Some(link) = LINK_KEYS
      .iter()
      .find_map(|key| data.get(*key).and_then(Value::as_str))
    {
      return self.resolve_uri(link);
    }

    let field = |key: &str| data.get(key).and_then(value_to_string);

    if let Some(screen) = field("screen") {
      let Some(screen) = parse_screen(&screen) else {
        warn!(%screen, "notification targets unknown screen");
        return NavigationIntent::home();
      };
      let params = data
        .iter()
        .filter(|(key, _)| key.as_str() != "screen")
        .filter_map(|(key, value)| value_to_string(value).map(|v| (key.clone(), v)))
        .collect();
      return self.validated(NavigationIntent { screen, params });
    }

    let kind = data
      .get("type")
      .cloned()
      .and_then(|kind| serde_json::from_value::<NotificationKind>(kind).ok());
    let intent = match (kind, field("artistId")) {
      (Some(_), Some(artist_id)) => {
        let mut intent = NavigationIntent::new(Screen::ArtistDetail).with_param("artistId", artist_id);
        if let Some(name) = field("artistName") {
          intent = intent.with_param("artistName", name);
        }
        intent
      }
      (Some(NotificationKind::FavoriteEvent), None) => NavigationIntent::new(Screen::Favorites),
      _ => {
        debug!("notification data carries no navigation target");
        NavigationIntent::home()
      }
    };
    self.validated(intent)
  }

  fn validated(&self, intent: NavigationIntent) -> NavigationIntent {
    match sanitize(intent) {
      Ok(intent) => intent,
      Err(invalid) => {
        warn!(screen = ?invalid.screen, missing = invalid.missing, "invalid navigation params, going home");
        NavigationIntent::home()
      }
    }
  }

  /// Resolve and enqueue a URI.
  pub fn open_uri(&self, uri: &str) -> Dispatch {
    self.queue.enqueue_intent(self.resolve_uri(uri))
  }

  /// Resolve and enqueue notification data.
  pub fn open_notification(&self, data: &Map<String, Value>) -> Dispatch {
    self.queue.enqueue_intent(self.resolve_notification(data))
  }
}

/// Split a path into percent-decoded segments.
fn split_path(path: &str) -> Vec<String> {
  path
    .split('/')
    .map(|segment| percent_decode_str(segment).decode_utf8_lossy())
    .map(|segment| segment.trim().to_string())
    .filter(|s| !s.is_empty())
    .collect()
}

fn query_params(url: &Url) -> Params {
  url
    .query_pairs()
    .map(|(k, v)| (k.into_owned(), v.into_owned()))
    .collect()
}

/// Map path segments onto an intent. Params are validated afterwards.
fn match_path(segments: &[String], mut query: Params) -> NavigationIntent {
  let lowered: Vec<String> = segments.iter().map(|s| s.to_lowercase()).collect();
  let parts: Vec<&str> = lowered.iter().map(String::as_str).collect();

  match parts.as_slice() {
    [] => NavigationIntent::home(),
    ["artist" | "artists", _] => {
      let name = query
        .remove("artistName")
        .or_else(|| query.remove("name"))
        .unwrap_or_default();
      NavigationIntent::new(Screen::ArtistDetail)
        .with_param("artistId", segments[1].clone())
        .with_param("artistName", name)
    }
    // Missing id; fails validation below
    ["artist"] => NavigationIntent::new(Screen::ArtistDetail),
    ["news", _] => NavigationIntent::new(Screen::NewsDetail).with_param("newsId", segments[1].clone()),
    [path] => match lookup_static(path) {
      Some(screen) => NavigationIntent {
        screen,
        params: query,
      },
      None => {
        debug!(path, "unknown deep link path");
        NavigationIntent::home()
      }
    },
    _ => {
      debug!(path = %segments.join("/"), "unknown deep link path");
      NavigationIntent::home()
    }
  }
}

/// Accept either a route path (`program`) or a screen name (`ArtistDetail`).
fn parse_screen(name: &str) -> Option<Screen> {
  lookup_static(name).or_else(|| serde_json::from_value(Value::String(name.to_string())).ok())
}
