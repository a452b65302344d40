use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Sliding window width.
pub const WINDOW_MS: i64 = 60_000;

/// Redis key expiry, longer than the window so idle keys clean
/// themselves up.
pub const KEY_EXPIRY_SECONDS: i64 = 120;

/// Backing store for the sliding-window limiter. Records one request
/// at `now_ms`, prunes entries older than the window and returns the
/// number of requests remaining in the window, including this one.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn record_and_count(&self, key: &str, now_ms: i64) -> Result<u64, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// Sliding-window rate limiter shared across service replicas through
/// the backing store.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    store: Arc<dyn RateLimitStore>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self { store }
    }

    /// Whether this request is within the per-minute budget for the
    /// actor and endpoint. Store failures fail open: a broken limiter
    /// must not take down login for everyone.
    pub async fn allow(&self, actor: &str, endpoint: &str, limit_per_minute: u32) -> bool {
        let key = format!("rate:{}:{}", actor, endpoint);
        let now_ms = Utc::now().timestamp_millis();

        match self.store.record_and_count(&key, now_ms).await {
            Ok(count) => count <= u64::from(limit_per_minute),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    endpoint = %endpoint,
                    "Rate limit store unavailable, allowing request"
                );
                true
            }
        }
    }

    pub async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.store.health_check().await
    }
}

/// In-memory store for tests and local development. Keeps per-key
/// timestamp lists and prunes them the way the shared store does.
#[derive(Default)]
pub struct MockRateLimitStore {
    hits: Mutex<HashMap<String, Vec<i64>>>,
    unavailable: AtomicBool,
}

impl MockRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a store outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl RateLimitStore for MockRateLimitStore {
    async fn record_and_count(&self, key: &str, now_ms: i64) -> Result<u64, anyhow::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(anyhow::anyhow!("rate limit store unavailable"));
        }

        let mut hits = self
            .hits
            .lock()
            .map_err(|_| anyhow::anyhow!("rate limit lock poisoned"))?;
        let entry = hits.entry(key.to_string()).or_default();
        entry.push(now_ms);
        entry.retain(|&ts| ts > now_ms - WINDOW_MS);
        Ok(entry.len() as u64)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(anyhow::anyhow!("rate limit store unavailable"))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sixth_request_in_window_rejected() {
        let limiter = SlidingWindowLimiter::new(Arc::new(MockRateLimitStore::new()));

        for _ in 0..5 {
            assert!(limiter.allow("10.0.0.1", "login", 5).await);
        }
        assert!(!limiter.allow("10.0.0.1", "login", 5).await);
    }

    #[tokio::test]
    async fn test_actors_and_endpoints_are_isolated() {
        let limiter = SlidingWindowLimiter::new(Arc::new(MockRateLimitStore::new()));

        for _ in 0..5 {
            assert!(limiter.allow("10.0.0.1", "login", 5).await);
        }
        assert!(!limiter.allow("10.0.0.1", "login", 5).await);

        // A different actor and a different endpoint still have budget.
        assert!(limiter.allow("10.0.0.2", "login", 5).await);
        assert!(limiter.allow("10.0.0.1", "register", 3).await);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let store = MockRateLimitStore::new();
        let base = 1_700_000_000_000;

        for i in 0..5 {
            assert!(store.record_and_count("rate:ip:login", base + i).await.unwrap() <= 5);
        }
        assert_eq!(store.record_and_count("rate:ip:login", base + 5).await.unwrap(), 6);

        // 61 seconds later the old hits have aged out.
        let later = base + 61_000;
        assert_eq!(store.record_and_count("rate:ip:login", later).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let store = Arc::new(MockRateLimitStore::new());
        let limiter = SlidingWindowLimiter::new(store.clone());

        store.set_unavailable(true);
        assert!(limiter.allow("10.0.0.1", "login", 5).await);
    }
}
