//! Single-shot echo timeout guard.
//!
//! The guard is identified by the cycle number of the trigger that armed it. Expiry,
//! disarm and cancel all race for the same `AtomicU64` with `compare_exchange`, so
//! exactly one of them takes the guard; the others become no-ops.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::AbortHandle;

/// Marker for "no guard armed". Cycle numbers start at 1.
const DISARMED: u64 = 0;

/// Arms one deadline per trigger pulse, covering both channels.
#[derive(Debug)]
pub struct TimeoutSupervisor {
    timeout: Duration,
    armed: AtomicU64,
    task: Mutex<Option<(u64, AbortHandle)>>,
}

impl TimeoutSupervisor {
    /// Supervisor whose guards last `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            armed: AtomicU64::new(DISARMED),
            task: Mutex::new(None),
        }
    }

    /// Guard duration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Arm a guard for `cycle`, replacing any previous one.
    ///
    /// `on_expiry` runs at most once, and only if the guard is still armed for
    /// `cycle` when the deadline passes. Must be called from within a tokio runtime.
    pub fn arm<F>(self: &Arc<Self>, cycle: u64, on_expiry: F)
    where
        F: FnOnce(u64) + Send + 'static,
    {
        if cycle == DISARMED {
            return;
        }
        self.armed.store(cycle, Ordering::SeqCst);

        let supervisor = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(supervisor.timeout).await;
            if supervisor.take(cycle) {
                on_expiry(cycle);
            }
        })
        .abort_handle();

        if let Some((_, previous)) = self.task.lock().replace((cycle, handle)) {
            previous.abort();
        }
    }

    /// Both channels finished early: drop the guard for `cycle`.
    ///
    /// Returns false if the guard already fired, was cancelled, or belongs to
    /// another cycle.
    pub fn disarm(&self, cycle: u64) -> bool {
        if !self.take(cycle) {
            return false;
        }
        self.abort_task(cycle);
        true
    }

    /// Drop whatever guard is armed. Returns the cycle it covered, if any.
    pub fn cancel(&self) -> Option<u64> {
        let cycle = self.armed.swap(DISARMED, Ordering::SeqCst);
        if cycle == DISARMED {
            return None;
        }
        self.abort_task(cycle);
        Some(cycle)
    }

    /// Cycle of the currently armed guard.
    pub fn armed_cycle(&self) -> Option<u64> {
        let cycle = self.armed.load(Ordering::SeqCst);
        (cycle != DISARMED).then_some(cycle)
    }

    /// Whether a guard is pending.
    pub fn is_armed(&self) -> bool {
        self.armed_cycle().is_some()
    }

    fn take(&self, cycle: u64) -> bool {
        self.armed
            .compare_exchange(cycle, DISARMED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Abort the task of `cycle` only. A guard re-armed for a later cycle between
    /// the claim and this call keeps running.
    fn abort_task(&self, cycle: u64) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|(armed, _)| *armed == cycle) {
            if let Some((_, handle)) = task.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce(u64) + Send + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = {
            let fired = Arc::clone(&fired);
            move |_cycle| {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        };
        (fired, hook)
    }

    #[tokio::test(start_paused = true)]
    async fn expires_after_timeout() {
        let supervisor = Arc::new(TimeoutSupervisor::new(Duration::from_millis(60)));
        let (fired, hook) = counter();
        supervisor.arm(1, hook);
        assert_eq!(supervisor.armed_cycle(), Some(1));

        tokio::time::sleep(Duration::from_millis(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!supervisor.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_guard_never_fires() {
        let supervisor = Arc::new(TimeoutSupervisor::new(Duration::from_millis(60)));
        let (fired, hook) = counter();
        supervisor.arm(4, hook);
        assert!(supervisor.disarm(4));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_expiry_is_noop() {
        let supervisor = Arc::new(TimeoutSupervisor::new(Duration::from_millis(10)));
        let (fired, hook) = counter();
        supervisor.arm(2, hook);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.cancel(), None);
        assert!(!supervisor.disarm(2));
    }

    #[tokio::test(start_paused = true)]
    async fn rearm_replaces_previous_guard() {
        let supervisor = Arc::new(TimeoutSupervisor::new(Duration::from_millis(10)));
        let (first, first_hook) = counter();
        let (second, second_hook) = counter();
        supervisor.arm(1, first_hook);
        supervisor.arm(2, second_hook);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disarm_for_wrong_cycle_keeps_guard() {
        let supervisor = Arc::new(TimeoutSupervisor::new(Duration::from_millis(10)));
        let (fired, hook) = counter();
        supervisor.arm(5, hook);
        assert!(!supervisor.disarm(4));
        assert_eq!(supervisor.cancel(), Some(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn late_disarm_leaves_next_guard_running() {
        let supervisor = Arc::new(TimeoutSupervisor::new(Duration::from_millis(60)));
        let (first, first_hook) = counter();
        let (second, second_hook) = counter();
        supervisor.arm(1, first_hook);

        // disarm(1) split in two with a re-arm in between
        assert!(supervisor.take(1));
        supervisor.arm(2, second_hook);
        supervisor.abort_task(1);

        assert_eq!(supervisor.armed_cycle(), Some(2));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
        assert!(!supervisor.is_armed());
    }
}
