//! Connectivity monitor and one-shot retry scheduler.
//!
//! Retry policy: every armed timer fires **at most once** and then clears
//! itself. A dispatch that is still offline when its timer fires arms a new
//! timer on the same [`RetryHandle`], so one handle cancels the whole chain.
//! Cancelling never interrupts an attempt that has already started.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use protocol::{Environment, RequestDescriptor};
use tokio::task::AbortHandle;

/// Shortest delay a retry timer waits. Shorter intervals, zero included, are
/// raised to this so an offline chain cannot spin.
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// Work a retry timer performs when it fires.
pub type RetryAction = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Interval between offline retries and an optional cap on their number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before each retry.
    pub interval: Duration,
    /// Retries allowed before the dispatch gives up; `None` retries forever.
    pub limit: Option<u32>,
}

impl RetryPolicy {
    /// The policy a descriptor asks for.
    pub fn for_descriptor(descriptor: &RequestDescriptor) -> Self {
        Self {
            interval: descriptor.retry_interval().max(MIN_RETRY_INTERVAL),
            limit: descriptor.retry_limit(),
        }
    }

    /// `true` if another retry may be armed after `retries` have fired.
    pub fn allows(&self, retries: u32) -> bool {
        self.limit.map_or(true, |limit| retries < limit)
    }
}

/// Reads the environment's reachability flag and arms retry timers.
pub struct ConnectivityMonitor<E: Environment> {
    env: Arc<E>,
}

impl<E: Environment> Clone for ConnectivityMonitor<E> {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
        }
    }
}

impl<E: Environment> ConnectivityMonitor<E> {
    /// Creates a monitor over `env`.
    pub fn new(env: Arc<E>) -> Self {
        Self { env }
    }

    /// Current reachability. Re-read on every call.
    pub fn is_online(&self) -> bool {
        self.env.is_online()
    }

    /// Arms a new one-shot timer that runs `action` after `interval`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_retry(&self, interval: Duration, action: RetryAction) -> RetryHandle {
        let handle = RetryHandle::new();
        self.rearm(&handle, interval, action);
        handle
    }

    /// Arms another one-shot timer on an existing handle. `interval` is
    /// raised to [`MIN_RETRY_INTERVAL`].
    ///
    /// Returns `false`, dropping `action`, if the handle was cancelled.
    pub fn rearm(&self, handle: &RetryHandle, interval: Duration, action: RetryAction) -> bool {
        if handle.is_cancelled() {
            return false;
        }
        let interval = interval.max(MIN_RETRY_INTERVAL);
        handle.inner.armed.store(true, Ordering::SeqCst);

        let timer = handle.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            if !timer.disarm_for_fire() {
                return;
            }
            action().await;
        });

        if let Ok(mut slot) = handle.inner.task.lock() {
            *slot = Some(task.abort_handle());
        }
        true
    }
}

/// Controls the retry timer chain of one dispatch.
#[derive(Debug, Clone, Default)]
pub struct RetryHandle {
    inner: Arc<RetryInner>,
}

#[derive(Debug, Default)]
struct RetryInner {
    armed: AtomicBool,
    cancelled: AtomicBool,
    fired: AtomicU32,
    task: Mutex<Option<AbortHandle>>,
}

impl RetryHandle {
    /// A handle with no timer armed yet.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RetryInner::default()),
        }
    }

    /// `true` while a timer is pending.
    pub fn is_armed(&self) -> bool {
        self.inner.armed.load(Ordering::SeqCst)
    }

    /// `true` once [`RetryHandle::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// How many timers on this handle have fired.
    pub fn fired(&self) -> u32 {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Disarms the pending timer; its action will never run and no further
    /// timers can be armed on this handle.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.armed.store(false, Ordering::SeqCst);
        if let Ok(mut slot) = self.inner.task.lock() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
    }

    // Clears the timer at fire time. The abort handle is dropped first so a
    // later cancel cannot tear down the attempt the action starts.
    fn disarm_for_fire(&self) -> bool {
        if let Ok(mut slot) = self.inner.task.lock() {
            slot.take();
        }
        if self.is_cancelled() {
            return false;
        }
        self.inner.armed.store(false, Ordering::SeqCst);
        self.inner.fired.fetch_add(1, Ordering::SeqCst);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedEnvironment;
    use tokio::sync::mpsc;

    fn counting_action(tx: mpsc::UnboundedSender<()>) -> RetryAction {
        Box::new(move || {
            Box::pin(async move {
                let _ = tx.send(());
            })
        })
    }

    #[test]
    fn policy_limit_counts_retries() {
        let unbounded = RetryPolicy {
            interval: Duration::from_secs(1),
            limit: None,
        };
        assert!(unbounded.allows(u32::MAX - 1));

        let bounded = RetryPolicy {
            limit: Some(2),
            ..unbounded
        };
        assert!(bounded.allows(0));
        assert!(bounded.allows(1));
        assert!(!bounded.allows(2));

        let never = RetryPolicy {
            limit: Some(0),
            ..unbounded
        };
        assert!(!never.allows(0));
    }

    #[test]
    fn policy_follows_descriptor() {
        let descriptor = RequestDescriptor::builder("https://api.test/x")
            .unwrap()
            .retry_interval(Duration::from_millis(250))
            .retry_limit(Some(3))
            .build();
        assert_eq!(
            RetryPolicy::for_descriptor(&descriptor),
            RetryPolicy {
                interval: Duration::from_millis(250),
                limit: Some(3),
            }
        );
    }

    #[test]
    fn zero_interval_is_raised_to_minimum() {
        let descriptor = RequestDescriptor::builder("https://api.test/x")
            .unwrap()
            .retry_interval(Duration::ZERO)
            .build();
        assert_eq!(
            RetryPolicy::for_descriptor(&descriptor).interval,
            MIN_RETRY_INTERVAL
        );
    }

    #[test]
    fn online_flag_is_read_every_time() {
        let env = Arc::new(ScriptedEnvironment::new());
        let monitor = ConnectivityMonitor::new(Arc::clone(&env));
        assert!(monitor.is_online());
        env.set_online(false);
        assert!(!monitor.is_online());
        env.set_online(true);
        assert!(monitor.is_online());
    }

    #[tokio::test(start_paused = true)]
    async fn retry_fires_exactly_once_after_interval() {
        let monitor = ConnectivityMonitor::new(Arc::new(ScriptedEnvironment::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();

        let handle = monitor.schedule_retry(Duration::from_millis(3_600), counting_action(tx));
        assert!(handle.is_armed());

        rx.recv().await.unwrap();
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(3_600) && elapsed < Duration::from_millis(3_610),
            "fired after {elapsed:?}"
        );
        assert!(!handle.is_armed());
        assert_eq!(handle.fired(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_timer_still_waits() {
        let monitor = ConnectivityMonitor::new(Arc::new(ScriptedEnvironment::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let start = tokio::time::Instant::now();

        let handle = monitor.schedule_retry(Duration::ZERO, counting_action(tx));
        rx.recv().await.unwrap();
        assert!(start.elapsed() >= MIN_RETRY_INTERVAL);
        assert_eq!(handle.fired(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_retry_never_fires() {
        let monitor = ConnectivityMonitor::new(Arc::new(ScriptedEnvironment::new()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = monitor.schedule_retry(Duration::from_millis(100), counting_action(tx));
        handle.cancel();
        assert!(!handle.is_armed());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(handle.fired(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_handle_cannot_be_rearmed() {
        let monitor = ConnectivityMonitor::new(Arc::new(ScriptedEnvironment::new()));
        let (tx, _rx) = mpsc::unbounded_channel();

        let handle = monitor.schedule_retry(Duration::from_millis(100), counting_action(tx.clone()));
        handle.cancel();
        assert!(!monitor.rearm(&handle, Duration::from_millis(100), counting_action(tx)));
        assert!(!handle.is_armed());
    }
}
