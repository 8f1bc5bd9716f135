//! Busy-context bookkeeping and the worker scheduling math it feeds (spec
//! §3 "Busy context", §4.5 main-loop steps 1-2). The runtime suspension
//! itself is realized with `tokio::time::sleep`/`WriteLock::wait_for_release`
//! inside the processor's own task (see `worker.rs`); the types and pure
//! functions here are what the spec's scheduling rules are stated in terms
//! of, and are unit-testable independent of any socket or thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// A parking record for a processor that cannot currently make progress
/// (spec §3 "Busy context"). `deadline: None` encodes the spec's "busy
/// timeout ∞ means never surface, wait on write lock release forever"
/// (§8 boundary behaviors).
pub struct BusyContext {
    pub deadline: Option<Instant>,
    pub sleepable: bool,
    pub on_write_lock: bool,
    canceled: AtomicBool,
}

impl BusyContext {
    /// A processor waiting on a contended write lock (spec §4.4 step 4).
    pub fn on_write_lock(busy_timeout: Option<Duration>) -> Self {
        BusyContext {
            deadline: busy_timeout.map(|d| Instant::now() + d),
            sleepable: false,
            on_write_lock: true,
            canceled: AtomicBool::new(false),
        }
    }

    /// A processor re-parked after the engine itself reported busy (spec
    /// §4.4 step 6, "re-park as in step 4 with on-write-lock=false and
    /// sleepable=false").
    pub fn on_engine_busy(busy_timeout: Duration) -> Self {
        BusyContext {
            deadline: Some(Instant::now() + busy_timeout),
            sleepable: false,
            on_write_lock: false,
            canceled: AtomicBool::new(false),
        }
    }

    /// A `SLEEP(n)` statement parking itself for `n` seconds (spec §4.4
    /// step 6, §4.1 SELECT recognizer).
    pub fn sleeping(seconds: f64) -> Self {
        BusyContext {
            deadline: Some(Instant::now() + Duration::from_secs_f64(seconds.max(0.0))),
            sleepable: true,
            on_write_lock: false,
            canceled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    fn is_timed_out(&self, now: Instant) -> bool {
        matches!(self.deadline, Some(d) if now >= d)
    }

    /// Readiness per spec §3: "`now ≥ deadline` or (not sleepable and
    /// write lock has become available)".
    pub fn is_ready(&self, now: Instant, write_lock_available: bool) -> bool {
        self.is_canceled() || self.is_timed_out(now) || (!self.sleepable && write_lock_available)
    }
}

/// Spec §4.5 step 1: "Recompute `idleCheckInterval` as the min positive
/// timeout among (auth, sleep-out-of-tx, sleep-in-tx); `-1` (disabled) if
/// all are ≤ 0."
pub fn compute_idle_check_interval(auth_ms: i64, sleep_ms: i64, sleep_in_tx_ms: i64) -> i64 {
    [auth_ms, sleep_ms, sleep_in_tx_ms]
        .into_iter()
        .filter(|&t| t > 0)
        .min()
        .unwrap_or(-1)
}

/// Spec §4.5 step 2: the next select timeout, in milliseconds, given the
/// current busy set and whether the write lock is free. `idle_check_interval
/// < 0` means "disabled"; the caller should treat that as "no timeout"
/// (block until I/O or intake) when there are also no busy processors.
pub fn compute_select_timeout_ms(
    now: Instant,
    busy: &[&BusyContext],
    write_lock_available: bool,
    busy_min_wait_ms: u64,
    idle_check_interval_ms: i64,
) -> Option<u64> {
    if busy.is_empty() {
        return if idle_check_interval_ms < 0 { None } else { Some(idle_check_interval_ms as u64) };
    }

    let mut best: Option<u64> = None;
    for ctx in busy {
        let ready_now = ctx.is_canceled() || (!ctx.sleepable && write_lock_available);
        let candidate = if ready_now {
            0
        } else if !ctx.sleepable {
            // Ready (engine/write-lock busy) but the lock is still held
            // elsewhere: re-poll no sooner than `busy_min_wait_ms`.
            busy_min_wait_ms
        } else {
            match ctx.deadline {
                Some(d) => d.saturating_duration_since(now).as_millis().min(u64::MAX as u128) as u64,
                None => return None,
            }
        };
        best = Some(best.map_or(candidate, |b: u64| b.min(candidate)));
    }
    best
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idle_check_interval_takes_the_min_positive() {
        assert_eq!(compute_idle_check_interval(15_000, 8 * 3_600_000, 300_000), 15_000);
    }

    #[test]
    fn idle_check_interval_is_disabled_when_all_non_positive() {
        assert_eq!(compute_idle_check_interval(0, -1, 0), -1);
    }

    #[test]
    fn busy_context_ready_when_deadline_elapsed() {
        let ctx = BusyContext::on_engine_busy(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(ctx.is_ready(Instant::now(), false));
    }

    #[test]
    fn busy_context_on_write_lock_ready_when_lock_freed_even_before_deadline() {
        let ctx = BusyContext::on_write_lock(Some(Duration::from_secs(1000)));
        assert!(ctx.is_ready(Instant::now(), true));
        assert!(!ctx.is_ready(Instant::now(), false));
    }

    #[test]
    fn sleepable_busy_context_ignores_write_lock_availability() {
        let ctx = BusyContext::sleeping(1000.0);
        assert!(!ctx.is_ready(Instant::now(), true));
    }

    #[test]
    fn canceled_context_is_always_ready() {
        let ctx = BusyContext::sleeping(1000.0);
        ctx.cancel();
        assert!(ctx.is_ready(Instant::now(), false));
    }

    #[test]
    fn select_timeout_is_zero_when_a_write_lock_waiter_is_ready() {
        let ctx = BusyContext::on_write_lock(Some(Duration::from_secs(50)));
        let timeout = compute_select_timeout_ms(Instant::now(), &[&ctx], true, 100, 8_000);
        assert_eq!(timeout, Some(0));
    }

    #[test]
    fn select_timeout_uses_busy_min_wait_when_lock_still_held() {
        let ctx = BusyContext::on_engine_busy(Duration::from_secs(50));
        let timeout = compute_select_timeout_ms(Instant::now(), &[&ctx], false, 100, 8_000);
        assert_eq!(timeout, Some(100));
    }

    #[test]
    fn select_timeout_falls_back_to_idle_check_interval_when_no_busy() {
        let timeout = compute_select_timeout_ms(Instant::now(), &[], true, 100, 8_000);
        assert_eq!(timeout, Some(8_000));
    }
}
