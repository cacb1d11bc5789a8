//! Screens, the static route table, and per-screen parameter rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Navigation parameters, always string-valued after sanitizing.
pub type Params = BTreeMap<String, String>;

/// Every screen a navigation intent can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Screen {
  Home,
  Program,
  Artists,
  ArtistDetail,
  Favorites,
  Info,
  Settings,
  Partners,
  News,
  NewsDetail,
  Faq,
  Map,
  Debug,
}

/// Bottom tabs that own nested stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tab {
  HomeTab,
  ProgramTab,
  ArtistsTab,
  FavoritesTab,
  InfoTab,
}

impl Screen {
  /// The tab a screen is physically nested under, if any.
  ///
  /// Tab root screens are navigated to directly.
  pub fn parent_tab(self) -> Option<Tab> {
    match self {
      Screen::ArtistDetail => Some(Tab::ArtistsTab),
      Screen::Settings
      | Screen::Partners
      | Screen::News
      | Screen::NewsDetail
      | Screen::Faq
      | Screen::Map
      | Screen::Debug => Some(Tab::InfoTab),
      Screen::Home | Screen::Program | Screen::Artists | Screen::Favorites | Screen::Info => None,
    }
  }

  /// Param keys that must be present and non-empty.
  pub fn required_params(self) -> &'static [&'static str] {
    match self {
      Screen::ArtistDetail => &["artistId"],
      Screen::NewsDetail => &["newsId"],
      _ => &[],
    }
  }

  /// Optional param keys and the value used when they are missing or blank.
  pub fn param_defaults(self) -> &'static [(&'static str, &'static str)] {
    match self {
      Screen::ArtistDetail => &[("artistName", "")],
      _ => &[],
    }
  }
}

/// A request to show a screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationIntent {
  pub screen: Screen,
  #[serde(default)]
  pub params: Params,
}

impl NavigationIntent {
  pub fn new(screen: Screen) -> Self {
    Self {
      screen,
      params: Params::new(),
    }
  }

  pub fn home() -> Self {
    Self::new(Screen::Home)
  }

  pub fn with_param(mut self, key: &str, value: impl Into<String>) -> Self {
    self.params.insert(key.to_string(), value.into());
    self
  }

  /// Map onto the physical navigator layout.
  pub fn route(&self) -> Route {
    match self.screen.parent_tab() {
      Some(tab) => Route::Nested {
        tab,
        screen: self.screen,
        params: self.params.clone(),
      },
      None => Route::Direct {
        screen: self.screen,
        params: self.params.clone(),
      },
    }
  }
}

/// A concrete navigate call issued to the navigation surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
  Direct { screen: Screen, params: Params },
  Nested { tab: Tab, screen: Screen, params: Params },
}

/// Why intent params were rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidParams {
  pub screen: Screen,
  pub missing: &'static str,
}

/// Check required params, then trim values and fill defaults.
pub fn sanitize(intent: NavigationIntent) -> Result<NavigationIntent, InvalidParams> {
  let screen = intent.screen;
  let mut params: Params = intent
    .params
    .into_iter()
    .map(|(k, v)| (k, v.trim().to_string()))
    .collect();

  for key in screen.required_params() {
    if params.get(*key).map_or(true, |v| v.is_empty()) {
      return Err(InvalidParams {
        screen,
        missing: *key,
      });
    }
  }

  for (key, default) in screen.param_defaults() {
    let entry = params.entry(key.to_string()).or_default();
    if entry.is_empty() {
      *entry = default.to_string();
    }
  }

  Ok(NavigationIntent { screen, params })
}

/// A static deep-link path
#[derive(Debug, Clone)]
pub struct RouteDef {
  pub path: &'static str,
  pub aliases: &'static [&'static str],
  pub screen: Screen,
}

/// All static deep-link paths
pub const STATIC_ROUTES: &[RouteDef] = &[
  RouteDef {
    path: "home",
    aliases: &["start"],
    screen: Screen::Home,
  },
  RouteDef {
    path: "program",
    aliases: &["schedule", "timetable"],
    screen: Screen::Program,
  },
  RouteDef {
    path: "artists",
    aliases: &["lineup"],
    screen: Screen::Artists,
  },
  RouteDef {
    path: "favorites",
    aliases: &["favourites"],
    screen: Screen::Favorites,
  },
  RouteDef {
    path: "info",
    aliases: &[],
    screen: Screen::Info,
  },
  RouteDef {
    path: "settings",
    aliases: &[],
    screen: Screen::Settings,
  },
  RouteDef {
    path: "partners",
    aliases: &["sponsors"],
    screen: Screen::Partners,
  },
  RouteDef {
    path: "news",
    aliases: &[],
    screen: Screen::News,
  },
  RouteDef {
    path: "faq",
    aliases: &["help"],
    screen: Screen::Faq,
  },
  RouteDef {
    path: "map",
    aliases: &["venue"],
    screen: Screen::Map,
  },
  RouteDef {
    path: "debug",
    aliases: &[],
    screen: Screen::Debug,
  },
];

/// Look up a static path or alias, case-insensitively.
pub fn lookup_static(path: &str) -> Option<Screen> {
  let path = path.to_lowercase();
  STATIC_ROUTES
    .iter()
    .find(|def| def.path == path || def.aliases.contains(&path.as_str()))
    .map(|def| def.screen)
}
