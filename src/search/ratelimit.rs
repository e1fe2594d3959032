//! Token-bucket rate limiter shared by remote embedding providers.
//!
//! One limiter is created per context and handed to every worker, so the
//! aggregate request rate stays under the provider's limit no matter how many
//! batches are in flight. Callers that would exceed the budget wait.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<Bucket>,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    /// Bucket holding at most `capacity` tokens, refilled continuously.
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        let capacity = capacity.max(1) as f64;
        Self {
            capacity,
            refill_per_sec: refill_per_sec.max(f64::MIN_POSITIVE),
            state: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Limit to `rpm` requests per minute with a burst of one second's worth.
    pub fn per_minute(rpm: u32) -> Self {
        let rpm = rpm.max(1);
        let burst = rpm.div_ceil(60);
        Self::new(burst, rpm as f64 / 60.0)
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    /// Take one token, suspending until one is available.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.state.lock().await;
                self.refill(&mut bucket);
                if bucket.tokens >= 1.0 {
                    bucket.tokens -= 1.0;
                    return;
                }
                Duration::from_secs_f64((1.0 - bucket.tokens) / self.refill_per_sec)
            };
            debug!(wait_ms = wait.as_millis() as u64, "rate limit reached, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        bucket.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_wait() {
        let limiter = RateLimiter::new(2, 1.0);
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(10));

        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(999));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_across_tasks() {
        let limiter = std::sync::Arc::new(RateLimiter::per_minute(60));
        assert_eq!(limiter.capacity(), 1);
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // 1 burst token, then 3 more at 1/s
        assert!(start.elapsed() >= Duration::from_millis(2999));
    }

    #[test]
    fn test_per_minute_burst() {
        assert_eq!(RateLimiter::per_minute(3000).capacity(), 50);
        assert_eq!(RateLimiter::per_minute(0).capacity(), 1);
    }
}
