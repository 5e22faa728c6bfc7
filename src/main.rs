use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use offsync::config::Config;
use offsync::connectivity::ConnectivityMonitor;
use offsync::model::mapper::{bookmark_from_record, user_from_record};
use offsync::model::{Bookmark, BookmarkRecord, User, UserRecord};
use offsync::remote::HttpRemote;
use offsync::store::{LocalStore, SqliteStore};
use offsync::sync::{BackoffPolicy, CategoryHandle, CategorySpec, SyncManager};
use offsync::Resource;

#[derive(Parser, Debug)]
#[command(name = "offsync")]
#[command(about = "Offline-first refresh cache for remote resources")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offsync/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Run one immediate refresh and report the outcome
  Sync {
    /// Limit the refresh to one category
    #[arg(short = 'C', long)]
    category: Option<String>,
  },
  /// Keep the cache fresh on a schedule until interrupted
  Watch,
  /// Show per-category sync state
  Status,
  /// Print the cached entities of a category
  List { category: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(matches!(args.command, Command::Watch))?;
  let config = Config::load(args.config.as_deref())?;

  let engine = Engine::build(&config)?;

  match args.command {
    Command::Sync { category } => run_sync(&engine, category.as_deref()).await,
    Command::Watch => run_watch(&engine, &config).await,
    Command::Status => run_status(&engine),
    Command::List { category } => run_list(&engine, &category),
  }
}

/// The wired-up engine: every component constructed exactly once at
/// startup and passed explicitly. Nothing in here is a global.
struct Engine {
  monitor: Arc<ConnectivityMonitor>,
  store: Arc<SqliteStore>,
  remote: Arc<HttpRemote>,
  manager: Arc<SyncManager<SqliteStore>>,
  users: CategoryHandle<User>,
  bookmarks: CategoryHandle<Bookmark>,
}

impl Engine {
  fn build(config: &Config) -> Result<Self> {
    let monitor = Arc::new(ConnectivityMonitor::new());
    let store = match &config.database.path {
      Some(path) => Arc::new(SqliteStore::open(path)?),
      None => Arc::new(SqliteStore::open_default()?),
    };
    let remote = Arc::new(HttpRemote::new(
      &config.remote.url,
      Duration::from_secs(config.remote.timeout_secs),
    )?);
    let backoff = BackoffPolicy {
      base_secs: config.sync.backoff_base_secs,
      cap_secs: config.sync.backoff_cap_secs,
    };
    let manager = SyncManager::new(Arc::clone(&store), Arc::clone(&monitor), backoff);

    let users = manager.register(
      CategorySpec {
        name: "users",
        incremental: true,
        fingerprint: Some(remote.query_fingerprint("api/users")),
      },
      {
        let remote = Arc::clone(&remote);
        move |since| {
          let remote = Arc::clone(&remote);
          async move { remote.fetch_users(since).await }
        }
      },
    );
    let bookmarks = manager.register(
      CategorySpec {
        name: "bookmarks",
        incremental: true,
        fingerprint: Some(remote.query_fingerprint("api/bookmarks")),
      },
      {
        let remote = Arc::clone(&remote);
        move |since| {
          let remote = Arc::clone(&remote);
          async move { remote.fetch_bookmarks(since).await }
        }
      },
    );

    Ok(Self {
      monitor,
      store,
      remote,
      manager,
      users,
      bookmarks,
    })
  }
}

async fn run_sync(engine: &Engine, category: Option<&str>) -> Result<()> {
  if let Some(name) = category {
    if !engine.manager.category_names().iter().any(|n| *n == name) {
      return Err(eyre!("Unknown category: {name} (expected users or bookmarks)"));
    }
  }

  let mut users_rx = engine.users.observe();
  let mut bookmarks_rx = engine.bookmarks.observe();
  users_rx.borrow_and_update();
  bookmarks_rx.borrow_and_update();

  engine.manager.request_immediate_sync(category);

  let mut failed = false;
  if category.map_or(true, |c| c == "users") {
    failed |= report("users", &wait_outcome(&mut users_rx).await?);
  }
  if category.map_or(true, |c| c == "bookmarks") {
    failed |= report("bookmarks", &wait_outcome(&mut bookmarks_rx).await?);
  }

  if failed {
    Err(eyre!("sync failed"))
  } else {
    Ok(())
  }
}

/// Wait for the next non-loading emission after the current value.
async fn wait_outcome<E: Clone>(
  rx: &mut watch::Receiver<Resource<Vec<E>>>,
) -> Result<Resource<Vec<E>>> {
  loop {
    rx.changed()
      .await
      .map_err(|_| eyre!("observe stream closed"))?;
    let value = rx.borrow_and_update().clone();
    if !value.is_loading() {
      return Ok(value);
    }
  }
}

/// Print the outcome; returns true if it was a failure.
fn report<E>(category: &str, outcome: &Resource<Vec<E>>) -> bool {
  match outcome {
    Resource::Success(rows) => {
      println!("{category}: synced {} entries", rows.len());
      false
    }
    Resource::Error { message, data } => {
      println!(
        "{category}: sync failed: {message} ({} cached entries retained)",
        data.as_ref().map_or(0, Vec::len)
      );
      true
    }
    Resource::Loading { .. } => {
      println!("{category}: still loading");
      true
    }
  }
}

async fn run_watch(engine: &Engine, config: &Config) -> Result<()> {
  engine
    .manager
    .schedule_periodic_sync(Duration::from_secs(config.sync.interval_secs));
  let _retry = engine.manager.spawn_connectivity_retry();
  let _probe = {
    let remote = Arc::clone(&engine.remote);
    engine.monitor.spawn_probe(
      Duration::from_secs(config.connectivity.probe_interval_secs),
      move || {
        let remote = Arc::clone(&remote);
        async move { Some(remote.probe().await) }
      },
    )
  };
  // App-start trigger: refresh once right away.
  engine.manager.request_immediate_sync(None);

  let mut users_rx = engine.users.observe();
  let mut bookmarks_rx = engine.bookmarks.observe();
  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        info!("shutting down");
        break;
      }
      changed = users_rx.changed() => {
        changed.map_err(|_| eyre!("users stream closed"))?;
        log_resource("users", &users_rx.borrow_and_update());
      }
      changed = bookmarks_rx.changed() => {
        changed.map_err(|_| eyre!("bookmarks stream closed"))?;
        log_resource("bookmarks", &bookmarks_rx.borrow_and_update());
      }
    }
  }
  Ok(())
}

fn log_resource<E>(category: &str, resource: &Resource<Vec<E>>) {
  match resource {
    Resource::Success(rows) => info!(category, count = rows.len(), "cache refreshed"),
    Resource::Error { message, data } => warn!(
      category,
      error = %message,
      cached = data.as_ref().map_or(0, Vec::len),
      "refresh failed, serving cached data"
    ),
    Resource::Loading { data } => info!(
      category,
      cached = data.as_ref().map_or(0, Vec::len),
      "refresh in flight"
    ),
  }
}

fn run_status(engine: &Engine) -> Result<()> {
  let now = Utc::now();
  for name in engine.manager.category_names() {
    let Some(snapshot) = engine.manager.state_snapshot(name) else {
      continue;
    };
    let rows = match name {
      "users" => engine.store.get_all::<UserRecord>()?.len(),
      "bookmarks" => engine.store.get_all::<BookmarkRecord>()?.len(),
      _ => 0,
    };
    println!(
      "{name}: phase={:?} failures={} rows={rows} last_synced={} next_retry={}",
      snapshot.effective_phase(now),
      snapshot.consecutive_failures,
      format_time(snapshot.last_synced_at),
      format_time(snapshot.next_retry_at),
    );
  }
  Ok(())
}

fn format_time(time: Option<DateTime<Utc>>) -> String {
  time.map_or_else(|| "never".to_string(), |t| t.to_rfc3339())
}

fn run_list(engine: &Engine, category: &str) -> Result<()> {
  match category {
    "users" => {
      for user in engine.store.get_all::<UserRecord>()?.iter().map(user_from_record) {
        println!("{}\t{}\t{}", user.id, user.login, user.display_name);
      }
    }
    "bookmarks" => {
      for bookmark in engine
        .store
        .get_all::<BookmarkRecord>()?
        .iter()
        .map(bookmark_from_record)
      {
        println!(
          "{}\t{}\t{} (owner {})",
          bookmark.id, bookmark.title, bookmark.url, bookmark.owner_id
        );
      }
    }
    other => {
      return Err(eyre!("Unknown category: {other} (expected users or bookmarks)"));
    }
  }
  Ok(())
}

/// Console logging always; watch mode additionally writes non-blocking
/// daily-rotated files so long runs keep a trail.
fn init_logging(log_to_file: bool) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
  use tracing_subscriber::layer::SubscriberExt;
  use tracing_subscriber::util::SubscriberInitExt;

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("offsync=info"));
  let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
  let registry = tracing_subscriber::registry().with(filter).with(console);

  if log_to_file {
    let dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?
      .join("offsync")
      .join("logs");
    std::fs::create_dir_all(&dir).map_err(|e| eyre!("Failed to create log directory: {}", e))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "offsync.log"));
    registry
      .with(tracing_subscriber::fmt::layer().with_writer(writer).with_ansi(false))
      .init();
    Ok(Some(guard))
  } else {
    registry.init();
    Ok(None)
  }
}
