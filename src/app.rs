use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bootstrap::{BootstrapCoordinator, BootstrapDeps, BootstrapState};
use crate::cache::{CacheStore, KeyValueStorage};
use crate::clock::Clock;
use crate::config::Config;
use crate::content::{artist_list, ContentKind};
use crate::event::{AppEvent, EventHandler, FavoriteChange};
use crate::navigation::{DeepLinkResolver, NavigationQueue};
use crate::notifications::NotificationScheduler;
use crate::platform::{
  ContentFetcher, NavigationSurface, NetworkProbe, NotificationCenter, RemoteConfigClient,
};

/// The external collaborators the app runs against.
#[derive(Clone)]
pub struct Platform {
  pub storage: Arc<dyn KeyValueStorage>,
  pub clock: Arc<dyn Clock>,
  pub probe: Arc<dyn NetworkProbe>,
  pub remote: Arc<dyn RemoteConfigClient>,
  pub fetcher: Arc<dyn ContentFetcher>,
  pub notifications: Arc<dyn NotificationCenter>,
  pub navigator: Arc<dyn NavigationSurface>,
}

/// Process-wide context holding every service, constructed once at startup.
pub struct App {
  cache: CacheStore,
  bootstrap: BootstrapCoordinator,
  scheduler: NotificationScheduler,
  queue: NavigationQueue,
  deep_links: DeepLinkResolver,
}

impl App {
  pub fn new(config: &Config, platform: Platform) -> Self {
    let cache = CacheStore::new(platform.storage, platform.clock);

    let bootstrap = BootstrapCoordinator::new(BootstrapDeps {
      cache: cache.clone(),
      probe: platform.probe,
      remote: platform.remote,
      fetcher: platform.fetcher,
      notifications: Some(Arc::clone(&platform.notifications)),
      app_version: config.app_version(),
    });
    let scheduler = NotificationScheduler::new(
      platform.notifications,
      cache.clone(),
      config.notifications.lead_time_minutes,
    );
    let queue = NavigationQueue::new(platform.navigator);
    let deep_links = DeepLinkResolver::new(
      queue.clone(),
      config.deep_links.scheme.clone(),
      config.deep_links.hosts.clone(),
    );

    Self {
      cache,
      bootstrap,
      scheduler,
      queue,
      deep_links,
    }
  }

  pub fn cache(&self) -> &CacheStore {
    &self.cache
  }

  pub fn bootstrap(&self) -> &BootstrapCoordinator {
    &self.bootstrap
  }

  pub fn scheduler(&self) -> &NotificationScheduler {
    &self.scheduler
  }

  pub fn queue(&self) -> &NavigationQueue {
    &self.queue
  }

  pub fn deep_links(&self) -> &DeepLinkResolver {
    &self.deep_links
  }

  /// Run the startup sequence.
  pub async fn launch(&self) -> BootstrapState {
    let state = self.bootstrap.start().await;
    info!(%state, "launch finished");
    state
  }

  /// Process events until `Shutdown` or until every sender is gone.
  pub async fn run(&self, events: &mut EventHandler) {
    while let Some(event) = events.next().await {
      if !self.handle_event(event).await {
        break;
      }
    }
  }

  /// Handle one event. Returns false once the app should stop.
  pub async fn handle_event(&self, event: AppEvent) -> bool {
    match event {
      AppEvent::ConnectivityChanged(online) => {
        if let Some(state) = self.bootstrap.on_connectivity_change(online).await {
          info!(%state, "bootstrap re-run after connectivity change");
        }
      }
      AppEvent::NotificationOpened(data) => {
        let dispatch = self.deep_links.open_notification(&data);
        debug!(?dispatch, "notification opened");
      }
      AppEvent::DeepLink(uri) => {
        let dispatch = self.deep_links.open_uri(&uri);
        debug!(%uri, ?dispatch, "deep link opened");
      }
      AppEvent::NavigatorReady => {
        if let Err(e) = self.queue.set_ready().await {
          warn!(error = %e, "navigation queue could not drain");
        }
      }
      AppEvent::FavoriteToggled(change) => {
        if self.scheduler_active() {
          self.apply_favorite(change).await;
        }
      }
      AppEvent::TimelineRefreshed {
        favorite_event_ids,
        favorite_artist_ids,
      } => {
        if self.scheduler_active() {
          self.recompute_notifications(&favorite_event_ids, &favorite_artist_ids).await;
        }
      }
      AppEvent::Shutdown => {
        info!("shutting down");
        self.queue.shutdown();
        return false;
      }
    }
    true
  }

  /// Notifications are only derived once startup reached a ready state.
  fn scheduler_active(&self) -> bool {
    let state = self.bootstrap.state();
    if !state.is_ready() {
      debug!(%state, "ignoring notification work before the app is ready");
    }
    state.is_ready()
  }

  async fn apply_favorite(&self, change: FavoriteChange) {
    match change {
      FavoriteChange::Event {
        event_id,
        favorite: true,
      } => {
        let timeline = self.bootstrap.cached_timeline().unwrap_or_default();
        let Some(event) = timeline
          .iter()
          .find(|event| event.id.as_deref() == Some(event_id.as_str()))
        else {
          warn!(event_id, "favorited event not on the cached timeline");
          return;
        };

        let artist_name = event.interpret_id.as_ref().and_then(|artist_id| {
          self
            .artists()
            .into_iter()
            .find(|artist| &artist.id == artist_id)
            .map(|artist| artist.name)
        });
        if let Err(e) = self
          .scheduler
          .schedule_for_event(&event_id, event, artist_name.as_deref())
          .await
        {
          warn!(event_id, error = %e, "favorite reminder not scheduled");
        }
      }
      FavoriteChange::Event {
        event_id,
        favorite: false,
      } => {
        if let Err(e) = self.scheduler.cancel_for_event(&event_id).await {
          warn!(event_id, error = %e, "favorite reminder not cancelled");
        }
      }
      FavoriteChange::Artist {
        artist_id,
        artist_name,
        favorite: true,
      } => {
        let report = self.scheduler.schedule_for_artist(&artist_id, &artist_name).await;
        debug!(artist_id, scheduled = report.scheduled, "artist favorited");
      }
      FavoriteChange::Artist {
        artist_id,
        favorite: false,
        ..
      } => {
        let report = self.scheduler.cancel_for_artist(&artist_id).await;
        debug!(artist_id, cancelled = report.cancelled, "artist unfavorited");
      }
    }
  }

  async fn recompute_notifications(&self, event_ids: &[String], artist_ids: &[String]) {
    let events = self.scheduler.update_all_event_notifications(event_ids).await;
    let artists = self
      .scheduler
      .update_all_artist_notifications(artist_ids, &self.artists())
      .await;
    info!(
      events = events.scheduled,
      artists = artists.scheduled,
      failed = events.failures.len() + artists.failures.len(),
      "notifications recomputed after timeline refresh"
    );
  }

  fn artists(&self) -> Vec<crate::content::Artist> {
    self
      .cache
      .load::<Value>(ContentKind::Artists.cache_key())
      .map(|payload| artist_list(&payload))
      .unwrap_or_default()
  }
}
