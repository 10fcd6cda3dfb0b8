//! Wall clock and durable-timer sleeping.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

/// Longest single sleep; the remaining time is re-read from the clock after
/// each slice so a wall-clock adjustment shifts the wake-up accordingly.
const MAX_SLEEP_SLICE: Duration = Duration::from_secs(60);

#[async_trait]
pub trait Clock: Send + Sync {
    /// Unix time in milliseconds.
    fn now_ms(&self) -> u64;

    /// Return once `now_ms() >= wake_ms`.
    async fn sleep_until(&self, wake_ms: u64);
}

/// The system wall clock with tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    async fn sleep_until(&self, wake_ms: u64) {
        loop {
            let now = self.now_ms();
            if now >= wake_ms {
                return;
            }
            let remaining = Duration::from_millis(wake_ms - now);
            tokio::time::sleep(remaining.min(MAX_SLEEP_SLICE)).await;
        }
    }
}

/// A clock that only moves when told to. Sleeping jumps straight to the
/// wake time and records it.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    now_ms: u64,
    sleeps: Vec<u64>,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                now_ms,
                sleeps: Vec::new(),
            })),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.lock().now_ms = now_ms;
    }

    pub fn advance(&self, by: Duration) {
        self.lock().now_ms += by.as_millis() as u64;
    }

    /// Wake times passed to `sleep_until`, oldest first.
    pub fn sleeps(&self) -> Vec<u64> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.lock().now_ms
    }

    async fn sleep_until(&self, wake_ms: u64) {
        let mut state = self.lock();
        state.sleeps.push(wake_ms);
        state.now_ms = state.now_ms.max(wake_ms);
    }
}
