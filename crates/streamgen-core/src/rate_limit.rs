//! Rate limiting for record emission.
//!
//! Two pacers are provided:
//!
//! - [`TokenBucket`]: tokens refill continuously up to a burst capacity and
//!   are consumed per record. Shareable between tasks.
//! - [`RateLimiter`]: a fixed-interval pacer owned by a single worker.
//!
//! A rate of zero or below disables limiting for both.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Upper bound on a single sleep inside [`TokenBucket::wait_for_tokens`].
const MAX_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Token bucket rate limiter.
///
/// Refill and consumption happen under one lock, so concurrent callers can
/// never spend the same tokens twice.
#[derive(Debug)]
pub struct TokenBucket {
    /// Tokens added per second.
    rate: f64,
    /// Maximum tokens that can accumulate.
    capacity: f64,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug)]
struct TokenBucketState {
    tokens: f64,
    last_update: Instant,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// * `rate` - tokens added per second
    /// * `capacity` - maximum tokens (burst size)
    pub fn new(rate: f64, capacity: u32) -> Self {
        let capacity = f64::from(capacity);
        Self {
            rate,
            capacity,
            state: Mutex::new(TokenBucketState {
                tokens: capacity,
                last_update: Instant::now(),
            }),
        }
    }

    fn is_unlimited(&self) -> bool {
        self.rate <= 0.0
    }

    fn refill(&self, state: &mut TokenBucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_update).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.capacity);
        state.last_update = now;
    }

    /// Takes `n` tokens if available.
    ///
    /// On failure the refreshed token count is left untouched.
    pub fn consume(&self, n: u32) -> bool {
        if self.is_unlimited() {
            return true;
        }

        let mut state = self.state.lock();
        self.refill(&mut state);

        let n = f64::from(n);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Polls [`consume`](Self::consume) until it succeeds or `timeout` elapses.
    ///
    /// Returns whether the tokens were obtained. A `false` is backpressure,
    /// not a failure.
    pub async fn wait_for_tokens(&self, n: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.consume(n) {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let sleep = self
                .time_until_available(n)
                .min(MAX_POLL_INTERVAL)
                .min(deadline - now)
                .max(Duration::from_millis(1));
            tokio::time::sleep(sleep).await;
        }
    }

    fn time_until_available(&self, n: u32) -> Duration {
        let mut state = self.state.lock();
        self.refill(&mut state);
        let missing = (f64::from(n) - state.tokens).max(0.0);
        Duration::from_secs_f64(missing / self.rate)
    }

    /// Current token count after refill.
    pub fn tokens(&self) -> f64 {
        if self.is_unlimited() {
            return self.capacity;
        }
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }
}

/// Fixed-interval pacer.
///
/// Successive [`wait`](Self::wait) calls return at least `1 / rate` apart,
/// measured from the end of the previous wait. Time already spent between
/// calls counts toward the interval; an overrun does not build up credit.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Option<Duration>,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(rate_per_second: f64) -> Self {
        let interval = (rate_per_second > 0.0 && rate_per_second.is_finite())
            .then(|| Duration::from_secs_f64(1.0 / rate_per_second));
        Self {
            interval,
            last: None,
        }
    }

    /// Interval between calls, `None` when limiting is disabled.
    pub fn interval(&self) -> Option<Duration> {
        self.interval
    }

    pub async fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };

        if let Some(last) = self.last {
            let elapsed = last.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        self.last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: Duration, expected: Duration) {
        let delta = actual.abs_diff(expected);
        assert!(
            delta <= Duration::from_millis(3),
            "expected ~{expected:?}, got {actual:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bucket_starts_full_and_depletes() {
        let bucket = TokenBucket::new(1.0, 5);
        assert_eq!(bucket.tokens(), 5.0);

        for _ in 0..5 {
            assert!(bucket.consume(1));
        }
        assert!(!bucket.consume(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refill_after_more_than_one_interval() {
        let bucket = TokenBucket::new(10.0, 10);
        assert!(bucket.consume(10));

        tokio::time::advance(Duration::from_millis(50)).await;
        assert!(!bucket.consume(1));

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(bucket.consume(1));
        assert!(!bucket.consume(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tokens_capped_at_capacity() {
        let bucket = TokenBucket::new(100.0, 3);
        bucket.consume(2);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(bucket.tokens(), 3.0);
        assert!(!bucket.consume(4));
        assert_eq!(bucket.tokens(), 3.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_consume_keeps_tokens() {
        let bucket = TokenBucket::new(1.0, 4);
        assert!(bucket.consume(3));
        assert!(!bucket.consume(2));
        assert!(bucket.consume(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tokens_succeeds_after_refill() {
        let bucket = TokenBucket::new(2.0, 1);
        assert!(bucket.consume(1));

        let start = Instant::now();
        assert!(bucket.wait_for_tokens(1, Duration::from_secs(2)).await);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(500), "{waited:?}");
        assert!(waited < Duration::from_millis(700), "{waited:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_tokens_times_out() {
        let bucket = TokenBucket::new(1.0, 2);
        assert!(!bucket.wait_for_tokens(3, Duration::from_millis(350)).await);
    }

    #[tokio::test]
    async fn test_zero_rate_bucket_is_unlimited() {
        let bucket = TokenBucket::new(0.0, 1);
        for _ in 0..1000 {
            assert!(bucket.consume(5));
        }
        assert!(bucket.wait_for_tokens(100, Duration::ZERO).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_consumers_do_not_double_spend() {
        let bucket = std::sync::Arc::new(TokenBucket::new(0.001, 100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = std::sync::Arc::clone(&bucket);
                tokio::spawn(async move { (0..50).filter(|_| bucket.consume(1)).count() })
            })
            .collect();

        let mut granted = 0;
        for handle in handles {
            granted += handle.await.unwrap();
        }
        assert_eq!(granted, 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_spaces_calls() {
        let mut limiter = RateLimiter::new(10.0);
        let start = Instant::now();

        for _ in 0..5 {
            limiter.wait().await;
        }

        // First call returns immediately, four intervals follow.
        assert_close(start.elapsed(), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_counts_time_between_calls() {
        let mut limiter = RateLimiter::new(10.0);
        limiter.wait().await;

        tokio::time::advance(Duration::from_millis(60)).await;
        let start = Instant::now();
        limiter.wait().await;
        assert_close(start.elapsed(), Duration::from_millis(40));

        tokio::time::advance(Duration::from_millis(500)).await;
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert_close(start.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_rate_limiter_never_sleeps() {
        for rate in [0.0, -5.0] {
            let mut limiter = RateLimiter::new(rate);
            assert!(limiter.interval().is_none());

            let start = Instant::now();
            for _ in 0..10_000 {
                limiter.wait().await;
            }
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }
}
