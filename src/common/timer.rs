//! Owned timer handles
//!
//! Every timer is a value owned by the scope that started it:
//! - `Deadline`: a one-shot, resettable sleep polled inside `select!`
//! - `Ticker`: a recurring background task, aborted on drop
//!
//! Both hold a lease on the `TimerSet` they came from, so `pending()`
//! reports exactly the timers whose owners are still alive.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, Sleep};

/// Registry of live timers
#[derive(Debug, Clone, Default)]
pub struct TimerSet {
    counts: Arc<TimerCounts>,
}

#[derive(Debug, Default)]
struct TimerCounts {
    live: AtomicUsize,
    issued: AtomicUsize,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of timers not yet cancelled or dropped
    pub fn pending(&self) -> usize {
        self.counts.live.load(Ordering::SeqCst)
    }

    /// Number of timers ever started from this set
    pub fn issued(&self) -> usize {
        self.counts.issued.load(Ordering::SeqCst)
    }

    /// Start a one-shot deadline `after` from now
    pub fn deadline(&self, after: Duration) -> Deadline {
        Deadline {
            sleep: Box::pin(tokio::time::sleep(after)),
            period: after,
            _lease: TimerLease::new(&self.counts),
        }
    }

    /// Start a recurring ticker. The first tick fires one `period` from now;
    /// `tick` receives a zero-based tick counter.
    pub fn ticker<F, Fut>(&self, period: Duration, mut tick: F) -> Ticker
    where
        F: FnMut(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut count = 0u64;
            loop {
                interval.tick().await;
                tick(count).await;
                count = count.wrapping_add(1);
            }
        });

        Ticker {
            handle,
            _lease: TimerLease::new(&self.counts),
        }
    }
}

/// Counts one live timer until dropped
#[derive(Debug)]
struct TimerLease {
    counts: Arc<TimerCounts>,
}

impl TimerLease {
    fn new(counts: &Arc<TimerCounts>) -> Self {
        counts.live.fetch_add(1, Ordering::SeqCst);
        counts.issued.fetch_add(1, Ordering::SeqCst);
        Self {
            counts: Arc::clone(counts),
        }
    }
}

impl Drop for TimerLease {
    fn drop(&mut self) {
        self.counts.live.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One-shot timer; dropping it cancels it
#[derive(Debug)]
pub struct Deadline {
    sleep: Pin<Box<Sleep>>,
    period: Duration,
    _lease: TimerLease,
}

impl Deadline {
    /// Re-arm for a full period from now
    pub fn reset(&mut self) {
        self.sleep.as_mut().reset(Instant::now() + self.period);
    }
}

impl Future for Deadline {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.sleep.as_mut().poll(cx)
    }
}

/// Recurring timer task; dropping it aborts the task
#[derive(Debug)]
pub struct Ticker {
    handle: JoinHandle<()>,
    _lease: TimerLease,
}

impl Ticker {
    /// Explicit cancel, same as drop
    pub fn cancel(self) {}
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[tokio::test]
    async fn test_deadline_lease_released_on_drop() {
        let timers = TimerSet::new();
        let deadline = timers.deadline(Duration::from_secs(60));
        assert_eq!(timers.pending(), 1);
        drop(deadline);
        assert_eq!(timers.pending(), 0);
        assert_eq!(timers.issued(), 1);
    }

    #[tokio::test]
    async fn test_deadline_fires_and_resets() {
        let timers = TimerSet::new();
        let mut deadline = timers.deadline(Duration::from_millis(20));
        let start = Instant::now();
        (&mut deadline).await;
        assert!(start.elapsed() >= Duration::from_millis(20));
        deadline.reset();
        (&mut deadline).await;
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_ticker_stops_on_cancel() {
        let timers = TimerSet::new();
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        let ticker = timers.ticker(Duration::from_millis(10), move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(timers.pending(), 1);

        tokio::time::sleep(Duration::from_millis(55)).await;
        ticker.cancel();
        assert_eq!(timers.pending(), 0);

        let seen = ticks.load(Ordering::SeqCst);
        assert!(seen >= 2, "expected several ticks, saw {}", seen);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), seen);
    }
}
