//! Per-category sync state and the retry backoff policy.
//!
//! One [`SyncState`] exists per registered category, created with zero
//! state on first reference and mutated only by the sync manager under
//! its per-category lock. It is process-local; the persisted side of
//! sync bookkeeping lives in the store's checkpoint table.

use chrono::{DateTime, Duration, Utc};

/// Coarse phase of a category's refresh lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
  /// No cycle in flight, nothing holding back the next one.
  Idle,
  /// A refresh cycle is in flight; new requests coalesce onto it.
  Running,
  /// The last cycle failed; periodic triggers wait out `next_retry_at`.
  Backoff,
}

/// Exponential retry backoff with a ceiling.
///
/// The delay after `n` consecutive failures is `base * 2^(n-1)` seconds,
/// capped at `cap_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
  pub base_secs: u64,
  pub cap_secs: u64,
}

impl Default for BackoffPolicy {
  fn default() -> Self {
    Self {
      base_secs: 30,
      cap_secs: 900,
    }
  }
}

impl BackoffPolicy {
  /// Delay before the next retry after `consecutive_failures` failures.
  pub fn delay_for(&self, consecutive_failures: u32) -> Duration {
    if consecutive_failures == 0 {
      return Duration::zero();
    }
    let exponent = consecutive_failures.saturating_sub(1).min(32);
    let secs = self
      .base_secs
      .saturating_mul(1u64 << exponent)
      .min(self.cap_secs);
    Duration::try_seconds(i64::try_from(secs).unwrap_or(i64::MAX)).unwrap_or(Duration::MAX)
  }
}

/// Process-local refresh bookkeeping for one category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncState {
  pub phase: SyncPhase,
  /// Completion time of the last successful cycle. Only ever advances.
  pub last_synced_at: Option<DateTime<Utc>>,
  pub consecutive_failures: u32,
  /// Earliest time a periodic trigger may start the next cycle after a
  /// failure. Manual requests ignore it.
  pub next_retry_at: Option<DateTime<Utc>>,
}

impl SyncState {
  pub fn new() -> Self {
    Self {
      phase: SyncPhase::Idle,
      last_synced_at: None,
      consecutive_failures: 0,
      next_retry_at: None,
    }
  }

  /// The phase as a status surface should report it: a backoff whose
  /// deadline has passed reads as idle.
  pub fn effective_phase(&self, now: DateTime<Utc>) -> SyncPhase {
    match self.phase {
      SyncPhase::Backoff if self.next_retry_at.map_or(true, |t| now >= t) => SyncPhase::Idle,
      phase => phase,
    }
  }

  /// The scheduling decision: claim the running slot if this trigger is
  /// allowed to start a cycle now.
  ///
  /// Returns false while a cycle is already running (the request
  /// coalesces onto it) and while a non-manual trigger arrives before
  /// the backoff deadline. Manual requests always bypass backoff.
  pub fn try_begin(&mut self, manual: bool, now: DateTime<Utc>) -> bool {
    match self.phase {
      SyncPhase::Running => false,
      SyncPhase::Backoff if !manual && self.next_retry_at.is_some_and(|t| now < t) => false,
      _ => {
        self.phase = SyncPhase::Running;
        true
      }
    }
  }

  /// A cycle completed: reset failure bookkeeping and advance the sync
  /// stamp monotonically.
  pub fn record_success(&mut self, now: DateTime<Utc>) {
    self.phase = SyncPhase::Idle;
    self.last_synced_at = Some(self.last_synced_at.map_or(now, |prev| prev.max(now)));
    self.consecutive_failures = 0;
    self.next_retry_at = None;
  }

  /// A cycle failed: count it and schedule the next eligible retry.
  pub fn record_failure(&mut self, policy: &BackoffPolicy, now: DateTime<Utc>) {
    self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    let delay = policy.delay_for(self.consecutive_failures);
    self.next_retry_at = Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC));
    self.phase = SyncPhase::Backoff;
  }
}

impl Default for SyncState {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
  }

  #[test]
  fn test_backoff_delay_doubles_and_caps() {
    let policy = BackoffPolicy {
      base_secs: 30,
      cap_secs: 900,
    };
    assert_eq!(policy.delay_for(1), Duration::seconds(30));
    assert_eq!(policy.delay_for(2), Duration::seconds(60));
    assert_eq!(policy.delay_for(3), Duration::seconds(120));
    assert_eq!(policy.delay_for(6), Duration::seconds(900));
    // Non-decreasing in the failure count, capped.
    let mut previous = Duration::zero();
    for n in 1..64 {
      let delay = policy.delay_for(n);
      assert!(delay >= previous);
      assert!(delay <= Duration::seconds(900));
      previous = delay;
    }
  }

  #[test]
  fn test_running_coalesces_all_triggers() {
    let mut state = SyncState::new();
    assert!(state.try_begin(false, at(0)));
    assert_eq!(state.phase, SyncPhase::Running);
    assert!(!state.try_begin(true, at(1)));
    assert!(!state.try_begin(false, at(1)));
  }

  #[test]
  fn test_manual_bypasses_backoff_periodic_waits() {
    let policy = BackoffPolicy::default();
    let mut state = SyncState::new();
    state.record_failure(&policy, at(0));
    assert_eq!(state.phase, SyncPhase::Backoff);

    // Periodic trigger before the deadline is refused.
    let mut periodic = state.clone();
    assert!(!periodic.try_begin(false, at(10)));
    assert_eq!(periodic.phase, SyncPhase::Backoff);

    // Manual request retries now.
    let mut manual = state.clone();
    assert!(manual.try_begin(true, at(10)));
    assert_eq!(manual.phase, SyncPhase::Running);

    // Once the deadline has passed, periodic triggers run again.
    assert!(state.try_begin(false, at(31)));
  }

  #[test]
  fn test_failure_deadlines_increase_and_success_resets() {
    let policy = BackoffPolicy {
      base_secs: 30,
      cap_secs: 900,
    };
    let mut state = SyncState::new();

    state.record_failure(&policy, at(0));
    let first = state.next_retry_at.unwrap();
    state.record_failure(&policy, at(5));
    let second = state.next_retry_at.unwrap();
    assert!(second > first);
    assert_eq!(state.consecutive_failures, 2);

    state.record_success(at(10));
    assert_eq!(state.phase, SyncPhase::Idle);
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.next_retry_at, None);
    assert_eq!(state.last_synced_at, Some(at(10)));
  }

  #[test]
  fn test_extreme_backoff_config_stays_total() {
    let policy = BackoffPolicy {
      base_secs: u64::MAX,
      cap_secs: u64::MAX,
    };
    let delay = policy.delay_for(7);
    assert!(delay > Duration::seconds(900));

    // Deadline arithmetic saturates instead of overflowing.
    let mut state = SyncState::new();
    state.record_failure(&policy, at(0));
    assert_eq!(state.phase, SyncPhase::Backoff);
    assert!(state.next_retry_at.unwrap() > at(0));
    assert!(!state.try_begin(false, at(1_000_000)));
  }

  #[test]
  fn test_last_synced_at_never_decreases() {
    let mut state = SyncState::new();
    state.record_success(at(100));
    state.record_success(at(50));
    assert_eq!(state.last_synced_at, Some(at(100)));
    state.record_success(at(200));
    assert_eq!(state.last_synced_at, Some(at(200)));
  }

  #[test]
  fn test_effective_phase_expires_backoff() {
    let policy = BackoffPolicy {
      base_secs: 30,
      cap_secs: 900,
    };
    let mut state = SyncState::new();
    state.record_failure(&policy, at(0));
    assert_eq!(state.effective_phase(at(10)), SyncPhase::Backoff);
    assert_eq!(state.effective_phase(at(31)), SyncPhase::Idle);
  }
}
