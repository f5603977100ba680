//! Minimum spacing between consecutive completion calls

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source for the limiter, swappable in tests
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by the tokio timer
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Enforces `min_interval` between the end of one call and the start of the next.
///
/// Callers `wait` before a call and `mark` once it returns. Before the first
/// `mark`, `wait` returns immediately; afterwards it sleeps only for whatever
/// part of the interval has not already elapsed since the last `mark`.
pub struct RateLimiter {
    min_interval: Duration,
    clock: Arc<dyn Clock>,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            clock,
            last: None,
        }
    }

    pub async fn wait(&self) {
        if let Some(last) = self.last {
            let elapsed = self.clock.now().saturating_duration_since(last);
            if elapsed < self.min_interval {
                self.clock.sleep(self.min_interval - elapsed).await;
            }
        }
    }

    /// Record that a call just finished
    pub fn mark(&mut self) {
        self.last = Some(self.clock.now());
    }
}

/// Clock that advances only when slept on or told to, recording every sleep
#[cfg(test)]
pub(crate) struct ManualClock {
    start: Instant,
    offset: std::sync::Mutex<Duration>,
    sleeps: std::sync::Mutex<Vec<Duration>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: std::sync::Mutex::new(Duration::ZERO),
            sleeps: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        self.advance(duration);
    }
}
