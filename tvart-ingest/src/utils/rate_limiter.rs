//! Minimum-interval gate for external APIs
//!
//! One limiter is shared (behind an `Arc`) by every caller hitting the same
//! host. The gate is held for the whole call: the wait happens before the
//! call and the timestamp is taken after it, so concurrent callers cannot
//! slip between a wait and the request it guards.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Rate limiter enforcing a minimum interval between call completions
#[derive(Debug)]
pub struct RateLimiter {
    last_call: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_call: Mutex::new(None),
            min_interval,
        }
    }

    pub fn from_millis(min_interval_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_interval_ms))
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Run `call` once the interval since the previous call has elapsed.
    ///
    /// The completion time is recorded whether the call succeeded or not.
    pub async fn throttled<F, Fut, T>(&self, call: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last = self.last_call.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let result = call().await;
        *last = Some(Instant::now());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_call_does_not_wait() {
        let limiter = RateLimiter::from_millis(500);
        let start = Instant::now();
        limiter.throttled(|| async {}).await;
        assert!(start.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_interval_measured_from_completion() {
        let limiter = RateLimiter::from_millis(100);

        limiter
            .throttled(|| async { tokio::time::sleep(Duration::from_millis(50)).await })
            .await;
        let finished_first = Instant::now();

        limiter.throttled(|| async {}).await;
        assert!(finished_first.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_shared_limiter_serializes_callers() {
        let limiter = Arc::new(RateLimiter::from_millis(50));
        let start = Instant::now();

        let a = limiter.clone();
        let b = limiter.clone();
        let (x, y) = tokio::join!(
            a.throttled(|| async { 1 }),
            b.throttled(|| async { 2 })
        );

        assert_eq!(x + y, 3);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
