//! Connectivity monitor: a reachability flag plus transition events.
//!
//! The current state is a lock-free atomic read, polled by the sync
//! manager before every scheduling decision. Transition fan-out goes
//! through unbounded channels, so a slow subscriber never blocks the
//! detection path. When no platform signal is available the monitor
//! stays optimistically online and lets downstream fetch failures drive
//! retries; it never blocks startup.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// A single reachability transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
  Online,
  Offline,
}

/// Tracks network reachability and fans transition events out to
/// subscribers. Constructed once at startup and passed explicitly to
/// whatever needs it.
pub struct ConnectivityMonitor {
  online: AtomicBool,
  listeners: Mutex<Vec<mpsc::UnboundedSender<ConnectivityEvent>>>,
}

impl ConnectivityMonitor {
  /// Starts optimistically online.
  pub fn new() -> Self {
    Self {
      online: AtomicBool::new(true),
      listeners: Mutex::new(Vec::new()),
    }
  }

  /// Lock-free read of the current reachability flag.
  pub fn currently_online(&self) -> bool {
    self.online.load(Ordering::Acquire)
  }

  /// Feed a reachability observation from the platform signal or a
  /// probe. Emits at most one event per actual transition; repeated
  /// observations of the same state are dropped.
  pub fn set_online(&self, online: bool) {
    // The listener lock serializes transitions so every subscriber sees
    // them in order. Sends are non-blocking; delivery happens on the
    // subscriber's own task.
    let mut listeners = self
      .listeners
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let previous = self.online.swap(online, Ordering::AcqRel);
    if previous == online {
      return;
    }
    let event = if online {
      ConnectivityEvent::Online
    } else {
      ConnectivityEvent::Offline
    };
    info!(?event, "connectivity changed");
    listeners.retain(|tx| tx.send(event).is_ok());
  }

  /// Register for transition events. Dropping (or closing) the
  /// subscription stops delivery.
  pub fn subscribe(&self) -> ConnectivitySubscription {
    let (tx, rx) = mpsc::unbounded_channel();
    self
      .listeners
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .push(tx);
    ConnectivitySubscription { rx }
  }

  /// Spawn a background prober that feeds the monitor at a fixed
  /// interval. A probe returning `None` means the platform signal is
  /// unavailable; the monitor then degrades to optimistic online.
  pub fn spawn_probe<F, Fut>(self: &Arc<Self>, interval: Duration, probe: F) -> JoinHandle<()>
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<bool>> + Send + 'static,
  {
    let monitor = Arc::clone(self);
    tokio::spawn(async move {
      let mut timer = tokio::time::interval(interval);
      loop {
        timer.tick().await;
        match probe().await {
          Some(online) => monitor.set_online(online),
          None => {
            debug!("connectivity signal unavailable, assuming online");
            monitor.set_online(true);
          }
        }
      }
    })
  }
}

impl Default for ConnectivityMonitor {
  fn default() -> Self {
    Self::new()
  }
}

/// Handle to a transition-event subscription.
pub struct ConnectivitySubscription {
  rx: mpsc::UnboundedReceiver<ConnectivityEvent>,
}

impl ConnectivitySubscription {
  /// Await the next transition. Returns `None` once the monitor is gone.
  pub async fn next(&mut self) -> Option<ConnectivityEvent> {
    self.rx.recv().await
  }

  /// Non-blocking poll for an already-delivered transition.
  pub fn try_next(&mut self) -> Option<ConnectivityEvent> {
    self.rx.try_recv().ok()
  }

  /// Stop delivery without dropping the handle.
  pub fn close(&mut self) {
    self.rx.close();
  }
}
