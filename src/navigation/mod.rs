//! Navigation intents, their buffering, and deep-link resolution.

mod deep_link;
mod queue;
mod routes;

pub use deep_link::DeepLinkResolver;
pub use queue::{Dispatch, DrainReport, NavigationQueue};
pub use routes::{
  lookup_static, sanitize, InvalidParams, NavigationIntent, Params, Route, RouteDef, Screen, Tab,
  STATIC_ROUTES,
};
