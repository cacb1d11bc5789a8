use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use lineup::app::{App, Platform};
use lineup::bootstrap::BootstrapState;
use lineup::cache::{CacheStore, KeyValueStorage, MemoryStorage, SqliteStorage, APP_VERSION_KEY};
use lineup::clock::{Clock, ManualClock, SystemClock};
use lineup::config::Config;
use lineup::content::{artist_list, ContentKind, REQUIRED_CONTENT_KEYS};
use lineup::event::{AppEvent, EventHandler};
use lineup::navigation::{DeepLinkResolver, NavigationQueue};
use lineup::notifications::{NotificationScheduler, LEAD_TIME_KEY};
use lineup::platform::{
  ContentFetcher, FixedProbe, HttpContentFetcher, HttpProbe, HttpRemoteConfig,
  MemoryNotificationCenter, NetworkProbe, RecordingNavigator, RemoteConfigClient,
  StaticContentFetcher, StaticRemoteConfig,
};
use lineup::Failure;

/// How often `launch --wait-for-network` re-probes connectivity.
const CONNECTIVITY_POLL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "lineup")]
#[command(about = "Offline-first startup core of a festival guide")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/lineup/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run the startup sequence and print where it landed
  Launch {
    /// Pretend the network is unreachable
    #[arg(long)]
    offline: bool,

    /// Serve content from a JSON file keyed by content type instead of the API
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Use an in-memory cache instead of the SQLite file
    #[arg(long)]
    ephemeral: bool,

    /// When blocked offline, keep probing and retry once the network returns
    #[arg(long)]
    wait_for_network: bool,
  },

  /// Print one content type, served from cache while fresh
  Show {
    /// artists, events, timeline, partners, news or faq
    kind: ContentKind,

    /// Pretend the network is unreachable
    #[arg(long)]
    offline: bool,

    /// Serve content from a JSON file keyed by content type instead of the API
    #[arg(long)]
    fixtures: Option<PathBuf>,
  },

  /// Resolve a deep link to a navigation intent
  Resolve { uri: String },

  /// Inspect or clear the content cache
  Cache {
    #[command(subcommand)]
    action: CacheAction,
  },

  /// Dry-run notification scheduling against the cached timeline
  Plan {
    /// Favorite event ids
    #[arg(long, value_delimiter = ',')]
    events: Vec<String>,

    /// Favorite artist ids
    #[arg(long, value_delimiter = ',')]
    artists: Vec<String>,

    /// Override the lead time in minutes for this run
    #[arg(long)]
    lead_time: Option<i64>,

    /// Evaluate trigger times as of this instant (RFC 3339)
    #[arg(long)]
    now: Option<DateTime<Utc>>,
  },
}

#[derive(Subcommand, Debug)]
enum CacheAction {
  /// Show validity and age of every content cache
  Status,
  /// Delete every content cache entry
  Clear,
}

fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lineup=info"));

  let Some(path) = log_file else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  };

  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_ansi(false)
    .with_writer(writer)
    .init();
  Ok(Some(guard))
}

fn open_storage(config: &Config, ephemeral: bool) -> Result<Arc<dyn KeyValueStorage>> {
  if ephemeral {
    return Ok(Arc::new(MemoryStorage::new()));
  }
  let storage = match &config.storage.path {
    Some(path) => SqliteStorage::open_at(path)?,
    None => SqliteStorage::open()?,
  };
  Ok(Arc::new(storage))
}

fn load_fixtures(path: &Path) -> Result<StaticContentFetcher> {
  let contents = std::fs::read_to_string(path)
    .map_err(|e| eyre!("Failed to read fixtures {}: {}", path.display(), e))?;
  let value: Value = serde_json::from_str(&contents)
    .map_err(|e| eyre!("Failed to parse fixtures {}: {}", path.display(), e))?;
  let object = value
    .as_object()
    .ok_or_else(|| eyre!("Fixtures must be a JSON object keyed by content type"))?;
  Ok(StaticContentFetcher::from_object(object))
}

fn print_state(app: &App) -> Result<()> {
  let progress = app.bootstrap().progress();
  println!("{}", serde_json::to_string_pretty(&app.bootstrap().state())?);
  println!("preloaded {}/{} content types", progress.completed, progress.total);
  Ok(())
}

type Collaborators = (
  Arc<dyn NetworkProbe>,
  Arc<dyn RemoteConfigClient>,
  Arc<dyn ContentFetcher>,
);

/// Fixture-backed collaborators, or the HTTP ones for the configured API.
fn collaborators(config: &Config, offline: bool, fixtures: Option<&Path>) -> Result<Collaborators> {
  let defaults = config.remote_defaults.to_values(&config.app_version());

  if let Some(path) = fixtures {
    let probe: Arc<dyn NetworkProbe> = Arc::new(FixedProbe::new(!offline));
    let remote: Arc<dyn RemoteConfigClient> = Arc::new(StaticRemoteConfig::new(defaults));
    let fetcher: Arc<dyn ContentFetcher> = Arc::new(load_fixtures(path)?);
    return Ok((probe, remote, fetcher));
  }

  let base_url = config.base_url()?;
  let token = Config::api_token();
  let probe: Arc<dyn NetworkProbe> = if offline {
    Arc::new(FixedProbe::new(false))
  } else {
    Arc::new(HttpProbe::new(base_url)?)
  };
  let remote: Arc<dyn RemoteConfigClient> = Arc::new(HttpRemoteConfig::new(
    base_url,
    &config.api,
    token.as_deref(),
    defaults,
  )?);
  let fetcher: Arc<dyn ContentFetcher> =
    Arc::new(HttpContentFetcher::new(base_url, &config.api, token.as_deref())?);
  Ok((probe, remote, fetcher))
}

async fn launch(
  config: &Config,
  offline: bool,
  fixtures: Option<&Path>,
  ephemeral: bool,
  wait_for_network: bool,
) -> Result<()> {
  let storage = open_storage(config, ephemeral)?;
  let (probe, remote, fetcher) = collaborators(config, offline, fixtures)?;

  let platform = Platform {
    storage,
    clock: Arc::new(SystemClock),
    probe: Arc::clone(&probe),
    remote,
    fetcher,
    notifications: Arc::new(MemoryNotificationCenter::new(true)),
    navigator: Arc::new(RecordingNavigator::new(true)),
  };
  let app = App::new(config, platform);

  let state = app.launch().await;
  if !(wait_for_network && state == BootstrapState::OfflineBlocked) {
    return print_state(&app);
  }

  info!("offline with no cached data, waiting for the network");
  let mut events = EventHandler::new();
  let watcher = events.watch_connectivity(probe, CONNECTIVITY_POLL);
  let tx = events.sender();
  let mut states = app.bootstrap().subscribe();

  let settled = async move {
    loop {
      let state = states.borrow_and_update().clone();
      if !state.is_loading() && state != BootstrapState::OfflineBlocked {
        break;
      }
      if states.changed().await.is_err() {
        break;
      }
    }
    let _ = tx.send(AppEvent::Shutdown);
  };

  tokio::select! {
    _ = async { tokio::join!(app.run(&mut events), settled) } => {}
    _ = tokio::signal::ctrl_c() => info!("interrupted"),
  }
  watcher.abort();
  print_state(&app)
}

/// Print one content type, served cache-first.
async fn show(config: &Config, kind: ContentKind, offline: bool, fixtures: Option<&Path>) -> Result<()> {
  let cache = CacheStore::new(open_storage(config, false)?, Arc::new(SystemClock));
  let (probe, _, fetcher) = collaborators(config, offline, fixtures)?;
  let online = probe.is_online().await;

  let result = cache
    .fetch_cached(kind.cache_key(), || async move {
      if !online {
        return Err(Failure::Offline);
      }
      fetcher.fetch(kind).await
    })
    .await?;

  println!("{}", serde_json::to_string_pretty(&result.data)?);
  match result.cached_at {
    Some(at) => println!("source: {:?} (cached {})", result.source, at.to_rfc3339()),
    None => println!("source: {:?}", result.source),
  }
  Ok(())
}

fn resolve(config: &Config, uri: &str) -> Result<()> {
  let queue = NavigationQueue::new(Arc::new(RecordingNavigator::new(false)));
  let resolver = DeepLinkResolver::new(queue, config.deep_links.scheme.clone(), config.deep_links.hosts.clone());

  let intent = resolver.resolve_uri(uri);
  println!("{}", serde_json::to_string_pretty(&intent)?);
  println!("{}", serde_json::to_string_pretty(&intent.route())?);
  Ok(())
}

fn cache_status(cache: &CacheStore) {
  println!("{:<10} {:<7} AGE", "CONTENT", "VALID");
  for kind in ContentKind::ALL {
    let key = kind.cache_key();
    let age = cache
      .age(key)
      .map(|age| format!("{}m", age.num_minutes()))
      .unwrap_or_else(|| "-".to_string());
    println!("{:<10} {:<7} {}", key, cache.has_valid(key), age);
  }

  let usable = cache.has_any_valid(&REQUIRED_CONTENT_KEYS);
  println!();
  println!("usable offline: {}", usable);
  if let Some(oldest) = cache.oldest_age(&REQUIRED_CONTENT_KEYS) {
    println!("oldest entry:   {}m", oldest.num_minutes());
  }
  for key in [APP_VERSION_KEY, lineup::bootstrap::SKIPPED_VERSION_KEY, LEAD_TIME_KEY] {
    println!("{:<15} {}", format!("{}:", key), cache.marker(key).unwrap_or_else(|| "-".into()));
  }
}

async fn plan(
  config: &Config,
  events: &[String],
  artists: &[String],
  lead_time: Option<i64>,
  now: Option<DateTime<Utc>>,
) -> Result<()> {
  let clock: Arc<dyn Clock> = match now {
    Some(at) => Arc::new(ManualClock::new(at)),
    None => Arc::new(SystemClock),
  };
  let cache = CacheStore::new(open_storage(config, false)?, clock);
  let center = Arc::new(MemoryNotificationCenter::new(true));

  let mut scheduler = NotificationScheduler::new(center.clone(), cache.clone(), config.notifications.lead_time_minutes);
  if let Some(minutes) = lead_time {
    scheduler = scheduler
      .with_lead_time(minutes)
      .map_err(|e| eyre!("--lead-time: {}", e))?;
  }

  let artist_records = cache
    .load::<Value>(ContentKind::Artists.cache_key())
    .map(|payload| artist_list(&payload))
    .unwrap_or_default();
  let event_report = scheduler.update_all_event_notifications(events).await;
  let artist_report = scheduler
    .update_all_artist_notifications(artists, &artist_records)
    .await;

  let mut pending = center.pending();
  pending.sort_by_key(|n| n.trigger_at);
  for notification in &pending {
    println!(
      "{}  {:<40} {} | {}",
      notification.trigger_at.to_rfc3339(),
      notification.identifier,
      notification.title,
      notification.body
    );
  }
  println!(
    "{} scheduled, {} skipped (lead time {}m)",
    pending.len(),
    event_report.skipped + artist_report.skipped,
    scheduler.lead_time_minutes()
  );
  for (identifier, error) in event_report.failures.iter().chain(&artist_report.failures) {
    println!("failed {}: {}", identifier, error);
  }
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing(args.log_file.as_deref())?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  match args.command {
    Command::Launch {
      offline,
      fixtures,
      ephemeral,
      wait_for_network,
    } => launch(&config, offline, fixtures.as_deref(), ephemeral, wait_for_network).await,
    Command::Show {
      kind,
      offline,
      fixtures,
    } => show(&config, kind, offline, fixtures.as_deref()).await,
    Command::Resolve { uri } => resolve(&config, &uri),
    Command::Cache { action } => {
      let cache = CacheStore::new(open_storage(&config, false)?, Arc::new(SystemClock));
      match action {
        CacheAction::Status => cache_status(&cache),
        CacheAction::Clear => {
          let removed = cache.clear_all()?;
          println!("removed {} cache entries", removed);
        }
      }
      Ok(())
    }
    Command::Plan {
      events,
      artists,
      lead_time,
      now,
    } => plan(&config, &events, &artists, lead_time, now).await,
  }
}
