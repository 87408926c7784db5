//! Debounce scheduler for free-text input.
//!
//! # Design
//! - Each `schedule` call replaces the pending timer; only the last value of a
//!   burst commits.
//! - Once the timer fires the commit runs on its own task, so a later burst
//!   can only cancel timers, never a commit that already started.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Default quiet period before search input commits.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Restartable single-slot timer.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl Debouncer {
    /// Scheduler with the given quiet period.
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Quiet period applied to every schedule.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Restart the timer; `commit` runs once it expires without a newer call.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn schedule<F>(&self, commit: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            tokio::spawn(commit);
        });
        if let Some(previous) = self.slot().replace(timer) {
            previous.abort();
        }
    }

    /// Cancel the pending timer, if any. Returns whether one was cancelled.
    pub fn cancel(&self) -> bool {
        self.slot().take().is_some_and(|timer| {
            let live = !timer.is_finished();
            timer.abort();
            live
        })
    }

    /// Whether a timer is waiting to fire.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    fn slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::time::Instant;

    type Commits = Arc<Mutex<Vec<(Duration, &'static str)>>>;

    fn record(commits: Commits, started: Instant, value: &'static str) -> impl Future<Output = ()> {
        async move {
            commits
                .lock()
                .expect("commit log poisoned")
                .push((started.elapsed(), value));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_commits_once_with_last_value() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let commits: Commits = Arc::default();
        let started = Instant::now();

        for (at, value) in [(0, "f"), (50, "fi"), (100, "fib"), (250, "fibe")] {
            tokio::time::sleep_until(started + Duration::from_millis(at)).await;
            debouncer.schedule(record(Arc::clone(&commits), started, value));
        }
        sleep(Duration::from_millis(1_000)).await;

        let commits = commits.lock().expect("commit log poisoned");
        assert_eq!(commits.as_slice(), &[(Duration::from_millis(550), "fibe")]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_commit() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let commits: Commits = Arc::default();
        let started = Instant::now();

        debouncer.schedule(record(Arc::clone(&commits), started, "x"));
        assert!(debouncer.is_pending());
        assert!(debouncer.cancel());
        sleep(Duration::from_millis(500)).await;

        assert!(commits.lock().expect("commit log poisoned").is_empty());
        assert!(!debouncer.is_pending());
        assert!(!debouncer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn separate_bursts_commit_separately() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let commits: Commits = Arc::default();
        let started = Instant::now();

        debouncer.schedule(record(Arc::clone(&commits), started, "a"));
        sleep(Duration::from_millis(400)).await;
        debouncer.schedule(record(Arc::clone(&commits), started, "b"));
        sleep(Duration::from_millis(400)).await;

        let values: Vec<_> = commits
            .lock()
            .expect("commit log poisoned")
            .iter()
            .map(|(_, value)| *value)
            .collect();
        assert_eq!(values, vec!["a", "b"]);
    }
}
