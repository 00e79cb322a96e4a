use log::debug;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Minimum spacing between outbound requests, shared by every caller.
///
/// The lock is held while waiting, so concurrent callers queue up and each
/// one starts at least `min_interval` after the previous one.
pub struct RateLimiter {
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    /// Suspends until the interval since the last acquire has elapsed, then
    /// records now as the last request time.
    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;

        if let Some(prev) = *last {
            let ready_at = prev + self.min_interval;
            let now = Instant::now();
            if now < ready_at {
                debug!("Rate limit: waiting {:?}", ready_at - now);
                sleep_until(ready_at).await;
            }
        }

        *last = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn first_call_is_not_delayed() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        let start = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_calls_are_spaced_by_the_interval() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        limiter.acquire().await;
        let first = Instant::now();
        limiter.acquire().await;
        assert!(Instant::now() - first >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn calls_far_apart_are_not_delayed() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        limiter.acquire().await;
        tokio::time::sleep(Duration::from_secs(3)).await;

        let before = Instant::now();
        limiter.acquire().await;
        assert_eq!(Instant::now(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn partial_wait_covers_only_the_remainder() {
        let limiter = RateLimiter::new(Duration::from_secs(2));
        limiter.acquire().await;
        let first = Instant::now();
        tokio::time::sleep(Duration::from_millis(500)).await;

        limiter.acquire().await;
        let waited = Instant::now() - first;
        assert!(waited >= Duration::from_secs(2));
        assert!(waited < Duration::from_millis(2100));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_serialized() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(2)));
        let start = Instant::now();

        let mut handles = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            handles.push(tokio::spawn(async move {
                limiter.acquire().await;
                Instant::now()
            }));
        }

        let mut starts = Vec::new();
        for handle in handles {
            starts.push(handle.await.unwrap());
        }
        starts.sort();

        assert_eq!(starts[0], start);
        assert!(starts[1] - starts[0] >= Duration::from_secs(2));
        assert!(starts[2] - starts[1] >= Duration::from_secs(2));
    }
}
