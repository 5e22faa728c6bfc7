//! Periodic refresh trigger.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Invokes a callback at a fixed interval on the runtime.
///
/// Registration is idempotent: installing a schedule aborts the previous
/// task first, so repeated calls replace rather than stack. Gating the
/// callback on connectivity is the caller's job.
pub struct PeriodicScheduler {
  task: Option<JoinHandle<()>>,
}

impl PeriodicScheduler {
  pub fn new() -> Self {
    Self { task: None }
  }

  /// Install the schedule, replacing any previous one.
  pub fn register<F>(&mut self, interval: Duration, tick: F)
  where
    F: Fn() + Send + Sync + 'static,
  {
    self.cancel();
    debug!(?interval, "registering periodic sync schedule");
    self.task = Some(tokio::spawn(async move {
      let mut timer = tokio::time::interval(interval);
      // The first tick of a tokio interval completes immediately;
      // consume it so the callback only fires after a full interval.
      timer.tick().await;
      loop {
        timer.tick().await;
        tick();
      }
    }));
  }

  /// Stop the schedule if one is installed.
  pub fn cancel(&mut self) {
    if let Some(task) = self.task.take() {
      task.abort();
    }
  }
}

impl Default for PeriodicScheduler {
  fn default() -> Self {
    Self::new()
  }
}

impl Drop for PeriodicScheduler {
  fn drop(&mut self) {
    self.cancel();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  #[tokio::test]
  async fn test_ticks_repeat_at_interval() {
    let count = Arc::new(AtomicU32::new(0));
    let mut scheduler = PeriodicScheduler::new();
    {
      let count = count.clone();
      scheduler.register(Duration::from_millis(20), move || {
        count.fetch_add(1, Ordering::SeqCst);
      });
    }

    tokio::time::sleep(Duration::from_millis(90)).await;
    assert!(count.load(Ordering::SeqCst) >= 2);
  }

  #[tokio::test]
  async fn test_reregister_replaces_previous_schedule() {
    let first = Arc::new(AtomicU32::new(0));
    let second = Arc::new(AtomicU32::new(0));
    let mut scheduler = PeriodicScheduler::new();
    {
      let first = first.clone();
      scheduler.register(Duration::from_millis(10), move || {
        first.fetch_add(1, Ordering::SeqCst);
      });
    }
    tokio::time::sleep(Duration::from_millis(35)).await;
    let first_before = first.load(Ordering::SeqCst);
    assert!(first_before >= 1);

    {
      let second = second.clone();
      scheduler.register(Duration::from_millis(10), move || {
        second.fetch_add(1, Ordering::SeqCst);
      });
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The first schedule stopped when the second replaced it.
    assert_eq!(first.load(Ordering::SeqCst), first_before);
    assert!(second.load(Ordering::SeqCst) >= 1);
  }

  #[tokio::test]
  async fn test_cancel_stops_ticks() {
    let count = Arc::new(AtomicU32::new(0));
    let mut scheduler = PeriodicScheduler::new();
    {
      let count = count.clone();
      scheduler.register(Duration::from_millis(10), move || {
        count.fetch_add(1, Ordering::SeqCst);
      });
    }
    tokio::time::sleep(Duration::from_millis(25)).await;
    scheduler.cancel();
    let seen = count.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(count.load(Ordering::SeqCst), seen);
  }
}
