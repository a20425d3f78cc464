//! Cancellable license renewal timers, one per content key identifier.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::debug;

#[derive(Debug)]
struct Timer {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
struct Timers {
    by_identifier: DashMap<String, Timer>,
    next_generation: AtomicU64,
}

/// Schedules deferred renewals.
///
/// Scheduling a renewal for an identifier that already has one replaces the
/// old timer. When a timer fires it forgets itself and runs the renewal as a
/// separate task on the scheduler's [`TaskTracker`], so cancelling later never
/// aborts a renewal already in progress and waiting on the tracker covers it.
#[derive(Debug, Default)]
pub struct RenewalScheduler {
    timers: Arc<Timers>,
    tasks: TaskTracker,
}

impl RenewalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run fired renewals on `tasks`.
    pub fn with_tracker(tasks: TaskTracker) -> Self {
        Self {
            timers: Arc::default(),
            tasks,
        }
    }

    /// Run `renewal` for `identifier` once `delay` has elapsed.
    pub fn schedule(&self, identifier: &str, delay: Duration, renewal: BoxFuture<'static, ()>) {
        let generation = self.timers.next_generation.fetch_add(1, Ordering::Relaxed);
        let timers = Arc::downgrade(&self.timers);
        let key = identifier.to_owned();
        let tasks = self.tasks.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(timers) = timers.upgrade() {
                timers
                    .by_identifier
                    .remove_if(&key, |_, timer| timer.generation == generation);
            }
            debug!(identifier = %key, "renewal timer fired");
            tasks.spawn(renewal);
        });

        if let Some(previous) = self
            .timers
            .by_identifier
            .insert(identifier.to_owned(), Timer { generation, handle })
        {
            previous.handle.abort();
        }
        debug!(identifier, delay_secs = delay.as_secs(), "renewal scheduled");
    }

    /// Cancel the pending renewal for `identifier`. Returns whether one was
    /// pending.
    pub fn cancel(&self, identifier: &str) -> bool {
        match self.timers.by_identifier.remove(identifier) {
            Some((_, timer)) => {
                timer.handle.abort();
                debug!(identifier, "renewal cancelled");
                true
            }
            None => false,
        }
    }

    /// Cancel every pending renewal.
    pub fn cancel_all(&self) {
        self.timers.by_identifier.retain(|_, timer| {
            timer.handle.abort();
            false
        });
    }

    /// Whether a renewal is pending for `identifier`.
    pub fn is_scheduled(&self, identifier: &str) -> bool {
        self.timers.by_identifier.contains_key(identifier)
    }

    /// Number of pending renewals.
    pub fn len(&self) -> usize {
        self.timers.by_identifier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.by_identifier.is_empty()
    }
}

impl Drop for RenewalScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use futures::FutureExt;

    use super::*;

    fn counting(counter: &Arc<AtomicUsize>) -> BoxFuture<'static, ()> {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let scheduler = RenewalScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler.schedule("skd://a", Duration::from_secs(3600), counting(&fired));
        assert!(scheduler.is_scheduled("skd://a"));

        tokio::time::advance(Duration::from_secs(3599)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!scheduler.is_scheduled("skd://a"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_firing() {
        let scheduler = RenewalScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        scheduler.schedule("skd://a", Duration::from_secs(10), counting(&fired));

        assert!(scheduler.cancel("skd://a"));
        assert!(!scheduler.cancel("skd://a"));
        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_replaces_timer() {
        let scheduler = RenewalScheduler::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        scheduler.schedule("skd://a", Duration::from_secs(10), counting(&first));
        scheduler.schedule("skd://a", Duration::from_secs(30), counting(&second));
        assert_eq!(scheduler.len(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fired_renewal_runs_on_tracker() {
        let tasks = TaskTracker::new();
        let scheduler = RenewalScheduler::with_tracker(tasks.clone());
        let fired = Arc::new(AtomicUsize::new(0));
        let slow = {
            let fired = Arc::clone(&fired);
            async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
                fired.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        };
        scheduler.schedule("skd://a", Duration::from_secs(5), slow);

        tokio::time::advance(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(tasks.len(), 1);

        tasks.close();
        tasks.wait().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_cancels_everything() {
        let fired = Arc::new(AtomicUsize::new(0));
        {
            let scheduler = RenewalScheduler::new();
            scheduler.schedule("skd://a", Duration::from_secs(5), counting(&fired));
            scheduler.schedule("skd://b", Duration::from_secs(5), counting(&fired));
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
