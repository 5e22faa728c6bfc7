//! The sync manager: refresh cycles, request coalescing, and the
//! observe stream.
//!
//! One manager owns every registered category. Each category gets its
//! own [`SyncState`] behind a mutex, a type-erased cycle closure, and a
//! watch channel carrying `Resource<Vec<E>>` to subscribers. Scheduling
//! decisions are synchronous; the only suspension points inside a cycle
//! are the remote fetch and the store write.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::scheduler::PeriodicScheduler;
use super::state::{BackoffPolicy, SyncState};
use super::Syncable;
use crate::connectivity::{ConnectivityEvent, ConnectivityMonitor};
use crate::remote::RemoteError;
use crate::resource::Resource;
use crate::store::{Checkpoint, LocalStore, Persistable};

/// Registration parameters for one synchronized category.
#[derive(Debug, Clone)]
pub struct CategorySpec {
  pub name: &'static str,
  /// Pass the persisted watermark as the since parameter on refetches.
  /// Full fetches delete rows absent from the result; incremental ones
  /// never delete.
  pub incremental: bool,
  /// Hash of the remote query shape. A checkpoint written under a
  /// different fingerprint is ignored and the next cycle fetches the
  /// full set.
  pub fingerprint: Option<String>,
}

type FetchFn<E> =
  Arc<dyn Fn(Option<DateTime<Utc>>) -> BoxFuture<'static, Result<Vec<E>, RemoteError>> + Send + Sync>;

type CycleFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct CategoryRuntime {
  state: Arc<Mutex<SyncState>>,
  run_cycle: CycleFn,
}

/// Typed read surface for one registered category.
pub struct CategoryHandle<E: Syncable> {
  name: &'static str,
  receiver: watch::Receiver<Resource<Vec<E>>>,
}

impl<E: Syncable> CategoryHandle<E> {
  pub fn name(&self) -> &'static str {
    self.name
  }

  /// Infinite, restartable stream of cache state. Every new subscriber
  /// immediately sees the current value, then one value per change.
  pub fn observe(&self) -> watch::Receiver<Resource<Vec<E>>> {
    self.receiver.clone()
  }
}

/// Orchestrates refresh cycles across all registered categories.
pub struct SyncManager<S: LocalStore + 'static> {
  store: Arc<S>,
  monitor: Arc<ConnectivityMonitor>,
  backoff: BackoffPolicy,
  categories: Mutex<HashMap<&'static str, CategoryRuntime>>,
  scheduler: Mutex<PeriodicScheduler>,
}

impl<S: LocalStore + 'static> SyncManager<S> {
  pub fn new(
    store: Arc<S>,
    monitor: Arc<ConnectivityMonitor>,
    backoff: BackoffPolicy,
  ) -> Arc<Self> {
    Arc::new(Self {
      store,
      monitor,
      backoff,
      categories: Mutex::new(HashMap::new()),
      scheduler: Mutex::new(PeriodicScheduler::new()),
    })
  }

  /// Install a category with its fetcher closure and return the typed
  /// read handle.
  ///
  /// The initial observed value is `success(cached)` when the store
  /// already holds rows for the category, `loading(None)` otherwise.
  pub fn register<E, F, Fut>(&self, spec: CategorySpec, fetcher: F) -> CategoryHandle<E>
  where
    E: Syncable,
    F: Fn(Option<DateTime<Utc>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Vec<E>, RemoteError>> + Send + 'static,
  {
    let name = spec.name;
    let initial = match self.store.get_all::<E::Record>() {
      Ok(rows) if !rows.is_empty() => {
        Resource::success(rows.iter().map(E::from_record).collect())
      }
      Ok(_) => Resource::loading(),
      // A cached row that no longer decodes is a schema bug; say so
      // instead of passing it off as an empty cache.
      Err(error) => {
        warn!(
          category = name,
          error = %error,
          "failed to read cached rows at registration, starting cold"
        );
        Resource::loading()
      }
    };
    let (sender, receiver) = watch::channel(initial);
    let sender = Arc::new(sender);
    let state = Arc::new(Mutex::new(SyncState::new()));
    let fetcher: FetchFn<E> = Arc::new(move |since| Box::pin(fetcher(since)));

    let run_cycle: CycleFn = {
      let store = Arc::clone(&self.store);
      let state = Arc::clone(&state);
      let backoff = self.backoff;
      Arc::new(move || {
        let store = Arc::clone(&store);
        let sender = Arc::clone(&sender);
        let state = Arc::clone(&state);
        let fetcher = Arc::clone(&fetcher);
        let spec = spec.clone();
        Box::pin(run_cycle::<E, S>(store, sender, state, fetcher, spec, backoff))
      })
    };

    let mut categories = lock(&self.categories);
    categories.insert(name, CategoryRuntime { state, run_cycle });
    debug!(category = name, "registered sync category");
    CategoryHandle { name, receiver }
  }

  /// Ask for a refresh now. Non-blocking: the cycle runs on the runtime
  /// and its outcome is delivered through the observe stream. Omitting
  /// the category requests all registered ones. Manual requests bypass
  /// backoff.
  pub fn request_immediate_sync(&self, category: Option<&str>) {
    self.request(category, true);
  }

  fn request(&self, category: Option<&str>, manual: bool) {
    // Offline is a soft skip: no state mutation, nothing emitted.
    if !self.monitor.currently_online() {
      debug!(?category, "skipping sync request while offline");
      return;
    }
    let now = Utc::now();
    let cycles: Vec<(&'static str, CycleFn)> = {
      let categories = lock(&self.categories);
      categories
        .iter()
        .filter_map(|(name, runtime)| {
          if category.map_or(false, |c| c != *name) {
            return None;
          }
          let mut state = lock(&runtime.state);
          state
            .try_begin(manual, now)
            .then(|| (*name, Arc::clone(&runtime.run_cycle)))
        })
        .collect()
    };
    for (name, cycle) in cycles {
      debug!(category = name, manual, "starting refresh cycle");
      tokio::spawn(cycle());
    }
  }

  /// Install the recurring trigger. Idempotent: calling again cancels
  /// and replaces the previous schedule. Periodic ticks respect backoff
  /// deadlines.
  pub fn schedule_periodic_sync(self: &Arc<Self>, interval: Duration) {
    let this = Arc::downgrade(self);
    let mut scheduler = lock(&self.scheduler);
    scheduler.register(interval, move || {
      if let Some(manager) = this.upgrade() {
        manager.request(None, false);
      }
    });
  }

  /// React to connectivity being restored with a deferred retry for all
  /// categories. Uses periodic semantics, so backoff deadlines hold.
  pub fn spawn_connectivity_retry(self: &Arc<Self>) -> JoinHandle<()> {
    let mut subscription = self.monitor.subscribe();
    let this = Arc::downgrade(self);
    tokio::spawn(async move {
      while let Some(event) = subscription.next().await {
        if event == ConnectivityEvent::Online {
          match this.upgrade() {
            Some(manager) => {
              info!("connectivity restored, requesting refresh");
              manager.request(None, false);
            }
            None => break,
          }
        }
      }
    })
  }

  /// Read-only view of a category's sync state for status surfaces.
  pub fn state_snapshot(&self, category: &str) -> Option<SyncState> {
    let categories = lock(&self.categories);
    categories
      .get(category)
      .map(|runtime| lock(&runtime.state).clone())
  }

  pub fn category_names(&self) -> Vec<&'static str> {
    let mut names: Vec<&'static str> = lock(&self.categories).keys().copied().collect();
    names.sort_unstable();
    names
  }
}

// A poisoned lock only means another cycle panicked mid-transition; the
// state itself stays usable, so recover the guard instead of unwinding.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_cycle<E: Syncable, S: LocalStore>(
  store: Arc<S>,
  sender: Arc<watch::Sender<Resource<Vec<E>>>>,
  state: Arc<Mutex<SyncState>>,
  fetcher: FetchFn<E>,
  spec: CategorySpec,
  backoff: BackoffPolicy,
) {
  let started = Utc::now();
  // Only a cold cache gets a loading emission; a warm one keeps showing
  // the last success until the cycle resolves.
  let has_cache = sender.borrow().data().map_or(false, |rows| !rows.is_empty());
  if !has_cache {
    sender.send_replace(Resource::loading());
  }

  match execute_cycle::<E, S>(&store, &fetcher, &spec, started).await {
    Ok(entities) => {
      let now = Utc::now();
      lock(&state).record_success(now);
      info!(
        category = spec.name,
        count = entities.len(),
        "refresh cycle succeeded"
      );
      sender.send_replace(Resource::success(entities));
    }
    Err(message) => {
      let next_retry_at = {
        let mut state = lock(&state);
        state.record_failure(&backoff, Utc::now());
        state.next_retry_at
      };
      warn!(
        category = spec.name,
        error = %message,
        next_retry = ?next_retry_at,
        "refresh cycle failed"
      );
      let stale: Option<Vec<E>> = store
        .get_all::<E::Record>()
        .ok()
        .filter(|rows| !rows.is_empty())
        .map(|rows| rows.iter().map(E::from_record).collect());
      let resource = match stale {
        Some(rows) => Resource::error_with(message, rows),
        None => Resource::error(message),
      };
      sender.send_replace(resource);
    }
  }
}

/// One refresh cycle: checkpoint, fetch, map, batch write, checkpoint
/// advance. Returns the full cached list on success, or the message to
/// surface on failure. Fetch and store failures take the same path; the
/// batch write itself is atomic, so a failed cycle commits nothing.
async fn execute_cycle<E: Syncable, S: LocalStore>(
  store: &S,
  fetcher: &FetchFn<E>,
  spec: &CategorySpec,
  started: DateTime<Utc>,
) -> Result<Vec<E>, String> {
  let checkpoint = store
    .read_checkpoint(spec.name)
    .map_err(|e| format!("checkpoint read failed: {e}"))?
    .filter(|c| c.fingerprint == spec.fingerprint);
  let since = if spec.incremental {
    checkpoint.as_ref().and_then(|c| c.watermark)
  } else {
    None
  };
  let full_fetch = since.is_none();

  let items = fetcher(since).await.map_err(|e| e.to_string())?;
  let now = Utc::now();

  if !full_fetch && items.is_empty() {
    // Nothing new remotely: advance the sync stamp, leave rows and the
    // watermark untouched.
    if let Some(previous) = checkpoint {
      let advanced = Checkpoint {
        last_synced_at: previous.last_synced_at.max(now),
        ..previous
      };
      store
        .write_checkpoint(spec.name, &advanced)
        .map_err(|e| format!("checkpoint write failed: {e}"))?;
    }
    let rows = store
      .get_all::<E::Record>()
      .map_err(|e| format!("cache read failed: {e}"))?;
    return Ok(rows.iter().map(E::from_record).collect());
  }

  let records: Vec<E::Record> = items.iter().map(Syncable::to_record).collect();
  debug_assert!(
    items
      .iter()
      .zip(&records)
      .all(|(entity, record)| E::from_record(record) == *entity),
    "mapper round-trip violated for category {}",
    spec.name
  );

  store
    .upsert_all(&records)
    .map_err(|e| format!("cache write failed: {e}"))?;
  if full_fetch {
    // Rows not touched by a full refresh no longer exist remotely.
    let removed = store
      .delete_stale::<E::Record>(started)
      .map_err(|e| format!("cache retention failed: {e}"))?;
    if removed > 0 {
      debug!(
        category = spec.name,
        removed, "dropped rows absent from full refresh"
      );
    }
  }

  let rows = store
    .get_all::<E::Record>()
    .map_err(|e| format!("cache read failed: {e}"))?;
  let watermark = checkpoint
    .as_ref()
    .and_then(|c| c.watermark)
    .into_iter()
    .chain(records.iter().filter_map(Persistable::updated_at))
    .max();
  let advanced = Checkpoint {
    last_synced_at: checkpoint.map_or(now, |c| c.last_synced_at.max(now)),
    watermark,
    fingerprint: spec.fingerprint.clone(),
    result_count: rows.len(),
  };
  store
    .write_checkpoint(spec.name, &advanced)
    .map_err(|e| format!("checkpoint write failed: {e}"))?;

  Ok(rows.iter().map(E::from_record).collect())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{User, UserRecord};
  use crate::resource::ResourceStatus;
  use crate::store::SqliteStore;
  use crate::sync::SyncPhase;
  use chrono::TimeZone;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn user(id: &str, secs: i64) -> User {
    User {
      id: id.to_string(),
      login: format!("login-{id}"),
      display_name: format!("User {id}"),
      avatar_url: None,
      updated_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    }
  }

  fn spec(name: &'static str) -> CategorySpec {
    CategorySpec {
      name,
      incremental: false,
      fingerprint: None,
    }
  }

  fn engine() -> (Arc<SqliteStore>, Arc<ConnectivityMonitor>, Arc<SyncManager<SqliteStore>>) {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    let monitor = Arc::new(ConnectivityMonitor::new());
    let manager = SyncManager::new(
      Arc::clone(&store),
      Arc::clone(&monitor),
      BackoffPolicy::default(),
    );
    (store, monitor, manager)
  }

  /// Wait for the next non-loading emission after the current value.
  async fn next_outcome(rx: &mut watch::Receiver<Resource<Vec<User>>>) -> Resource<Vec<User>> {
    tokio::time::timeout(Duration::from_secs(2), async {
      loop {
        rx.changed().await.expect("observe stream closed");
        let value = rx.borrow_and_update().clone();
        if !value.is_loading() {
          return value;
        }
      }
    })
    .await
    .expect("timed out waiting for a refresh outcome")
  }

  #[tokio::test]
  async fn test_empty_store_emits_loading_then_success() {
    let (store, _monitor, manager) = engine();
    let handle = manager.register(spec("users"), |_since| async {
      Ok(vec![user("u-1", 1), user("u-2", 2), user("u-3", 3)])
    });

    let mut rx = handle.observe();
    assert_eq!(rx.borrow_and_update().status(), ResourceStatus::Loading);

    manager.request_immediate_sync(Some("users"));
    let outcome = next_outcome(&mut rx).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.data().unwrap().len(), 3);
    assert_eq!(store.get_all::<UserRecord>().unwrap().len(), 3);

    let snapshot = manager.state_snapshot("users").unwrap();
    assert_eq!(snapshot.phase, SyncPhase::Idle);
    assert!(snapshot.last_synced_at.is_some());
  }

  #[tokio::test]
  async fn test_offline_request_is_a_silent_skip() {
    let (_store, monitor, manager) = engine();
    let fetches = Arc::new(AtomicU32::new(0));
    let handle = {
      let fetches = fetches.clone();
      manager.register(spec("users"), move |_since| {
        let fetches = fetches.clone();
        async move {
          fetches.fetch_add(1, Ordering::SeqCst);
          Ok(vec![user("u-1", 1)])
        }
      })
    };

    monitor.set_online(false);
    let mut rx = handle.observe();
    rx.borrow_and_update();
    manager.request_immediate_sync(Some("users"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(fetches.load(Ordering::SeqCst), 0);
    assert!(!rx.has_changed().unwrap());
    let snapshot = manager.state_snapshot("users").unwrap();
    assert_eq!(snapshot, SyncState::new());
  }

  #[tokio::test]
  async fn test_cached_store_stays_on_success_while_offline() {
    let (store, monitor, manager) = engine();
    store
      .upsert_all(&[user("u-1", 1).to_record(), user("u-2", 2).to_record()])
      .unwrap();
    let fetches = Arc::new(AtomicU32::new(0));
    let handle = {
      let fetches = fetches.clone();
      manager.register(spec("users"), move |_since| {
        let fetches = fetches.clone();
        async move {
          fetches.fetch_add(1, Ordering::SeqCst);
          Ok(Vec::<User>::new())
        }
      })
    };

    let mut rx = handle.observe();
    let initial = rx.borrow_and_update().clone();
    assert!(initial.is_success());
    assert_eq!(initial.data().unwrap().len(), 2);

    monitor.set_online(false);
    manager.request_immediate_sync(Some("users"));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // No fetch, no spurious loading; the last success stands.
    assert_eq!(fetches.load(Ordering::SeqCst), 0);
    assert!(!rx.has_changed().unwrap());
  }

  #[tokio::test]
  async fn test_concurrent_requests_coalesce_into_one_fetch() {
    let (_store, _monitor, manager) = engine();
    let fetches = Arc::new(AtomicU32::new(0));
    let handle = {
      let fetches = fetches.clone();
      manager.register(spec("users"), move |_since| {
        let fetches = fetches.clone();
        async move {
          fetches.fetch_add(1, Ordering::SeqCst);
          tokio::time::sleep(Duration::from_millis(80)).await;
          Ok(vec![user("u-1", 1)])
        }
      })
    };

    let mut first = handle.observe();
    let mut second = handle.observe();
    first.borrow_and_update();
    second.borrow_and_update();

    manager.request_immediate_sync(Some("users"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    manager.request_immediate_sync(Some("users"));
    manager.request_immediate_sync(None);

    let a = next_outcome(&mut first).await;
    let b = next_outcome(&mut second).await;
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(a, b);
    assert!(a.is_success());
  }

  #[tokio::test]
  async fn test_failures_surface_stale_data_then_recover() {
    let (store, _monitor, manager) = engine();
    store.upsert_all(&[user("u-1", 1).to_record()]).unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let handle = {
      let calls = calls.clone();
      manager.register(spec("users"), move |_since| {
        let calls = calls.clone();
        async move {
          if calls.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(RemoteError::Server(503))
          } else {
            Ok(vec![user("u-1", 1), user("u-9", 9)])
          }
        }
      })
    };
    let mut rx = handle.observe();
    rx.borrow_and_update();

    manager.request_immediate_sync(Some("users"));
    let first = next_outcome(&mut rx).await;
    assert!(first.is_error());
    assert!(first.message().unwrap().contains("503"));
    assert_eq!(first.data().unwrap().len(), 1);
    let after_first = manager.state_snapshot("users").unwrap();
    assert_eq!(after_first.consecutive_failures, 1);
    let first_retry = after_first.next_retry_at.unwrap();

    // Manual requests bypass the backoff deadline.
    manager.request_immediate_sync(Some("users"));
    let second = next_outcome(&mut rx).await;
    assert!(second.is_error());
    assert_eq!(second.data().unwrap().len(), 1);
    let after_second = manager.state_snapshot("users").unwrap();
    assert_eq!(after_second.consecutive_failures, 2);
    assert!(after_second.next_retry_at.unwrap() > first_retry);

    manager.request_immediate_sync(Some("users"));
    let third = next_outcome(&mut rx).await;
    assert!(third.is_success());
    assert_eq!(third.data().unwrap().len(), 2);
    let after_third = manager.state_snapshot("users").unwrap();
    assert_eq!(after_third.consecutive_failures, 0);
    assert_eq!(after_third.next_retry_at, None);
  }

  #[tokio::test]
  async fn test_incremental_fetch_uses_watermark_and_keeps_rows() {
    let (store, _monitor, manager) = engine();
    store.upsert_all(&[user("u-1", 1).to_record()]).unwrap();
    let watermark = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
    store
      .write_checkpoint(
        "users",
        &Checkpoint {
          last_synced_at: watermark,
          watermark: Some(watermark),
          fingerprint: Some("fp".to_string()),
          result_count: 1,
        },
      )
      .unwrap();

    let seen_since = Arc::new(Mutex::new(Vec::new()));
    let handle = {
      let seen_since = seen_since.clone();
      manager.register(
        CategorySpec {
          name: "users",
          incremental: true,
          fingerprint: Some("fp".to_string()),
        },
        move |since| {
          seen_since.lock().unwrap().push(since);
          async move { Ok(Vec::new()) }
        },
      )
    };
    let mut rx = handle.observe();
    rx.borrow_and_update();

    manager.request_immediate_sync(Some("users"));
    let outcome = next_outcome(&mut rx).await;
    assert!(outcome.is_success());
    assert_eq!(outcome.data().unwrap().len(), 1);

    assert_eq!(seen_since.lock().unwrap().as_slice(), &[Some(watermark)]);
    let checkpoint = store.read_checkpoint("users").unwrap().unwrap();
    assert_eq!(checkpoint.watermark, Some(watermark));
    assert!(checkpoint.last_synced_at >= watermark);
    assert_eq!(store.get_all::<UserRecord>().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_fingerprint_mismatch_forces_full_refetch_with_retention() {
    let (store, _monitor, manager) = engine();
    store
      .upsert_all(&[user("u-1", 1).to_record(), user("u-2", 2).to_record()])
      .unwrap();
    let watermark = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
    store
      .write_checkpoint(
        "users",
        &Checkpoint {
          last_synced_at: watermark,
          watermark: Some(watermark),
          fingerprint: Some("old".to_string()),
          result_count: 2,
        },
      )
      .unwrap();

    let seen_since = Arc::new(Mutex::new(Vec::new()));
    let handle = {
      let seen_since = seen_since.clone();
      manager.register(
        CategorySpec {
          name: "users",
          incremental: true,
          fingerprint: Some("new".to_string()),
        },
        move |since| {
          seen_since.lock().unwrap().push(since);
          async move { Ok(vec![user("u-3", 3)]) }
        },
      )
    };
    let mut rx = handle.observe();
    rx.borrow_and_update();

    manager.request_immediate_sync(Some("users"));
    let outcome = next_outcome(&mut rx).await;
    assert!(outcome.is_success());

    // Stale checkpoint ignored, full fetch issued, absent rows dropped.
    assert_eq!(seen_since.lock().unwrap().as_slice(), &[None]);
    let rows = store.get_all::<UserRecord>().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "u-3");
    let checkpoint = store.read_checkpoint("users").unwrap().unwrap();
    assert_eq!(checkpoint.fingerprint, Some("new".to_string()));
  }

  /// Old payload shape for the "users" category, missing most of the
  /// current record's required fields.
  #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
  struct LegacyUserRecord {
    id: String,
    nickname: String,
  }

  impl Persistable for LegacyUserRecord {
    fn record_id(&self) -> String {
      self.id.clone()
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
      None
    }

    fn category() -> &'static str {
      "users"
    }
  }

  #[tokio::test]
  async fn test_registration_over_undecodable_rows_starts_cold() {
    let (store, _monitor, manager) = engine();
    store
      .upsert(&LegacyUserRecord {
        id: "u-1".to_string(),
        nickname: "mira".to_string(),
      })
      .unwrap();

    // The stored payload no longer matches the current record shape;
    // registration must not present it as a warm cache.
    let handle = manager.register(spec("users"), |_since| async { Ok(vec![user("u-1", 1)]) });
    let mut rx = handle.observe();
    assert_eq!(rx.borrow_and_update().status(), ResourceStatus::Loading);
  }

  #[tokio::test]
  async fn test_connectivity_restore_triggers_deferred_retry() {
    let (_store, monitor, manager) = engine();
    let fetches = Arc::new(AtomicU32::new(0));
    let handle = {
      let fetches = fetches.clone();
      manager.register(spec("users"), move |_since| {
        let fetches = fetches.clone();
        async move {
          fetches.fetch_add(1, Ordering::SeqCst);
          Ok(vec![user("u-1", 1)])
        }
      })
    };
    let mut rx = handle.observe();
    rx.borrow_and_update();
    let _listener = manager.spawn_connectivity_retry();
    tokio::time::sleep(Duration::from_millis(10)).await;

    monitor.set_online(false);
    monitor.set_online(true);

    let outcome = next_outcome(&mut rx).await;
    assert!(outcome.is_success());
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_successive_cycles_never_decrease_last_synced_at() {
    let (_store, _monitor, manager) = engine();
    let handle = manager.register(spec("users"), |_since| async { Ok(vec![user("u-1", 1)]) });
    let mut rx = handle.observe();
    rx.borrow_and_update();

    manager.request_immediate_sync(Some("users"));
    next_outcome(&mut rx).await;
    let first = manager.state_snapshot("users").unwrap().last_synced_at.unwrap();

    manager.request_immediate_sync(Some("users"));
    next_outcome(&mut rx).await;
    let second = manager.state_snapshot("users").unwrap().last_synced_at.unwrap();
    assert!(second >= first);
  }
}
