use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use service_core::error::AppError;
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::services::rate_limit::{RateLimitStore, KEY_EXPIRY_SECONDS, WINDOW_MS};
use crate::services::revocation::RevocationLedger;

/// Redis-backed revocation ledger and rate limit store, shared by all
/// service replicas.
#[derive(Clone)]
pub struct RedisService {
    manager: ConnectionManager,
}

impl RedisService {
    pub async fn new(config: &RedisConfig) -> Result<Self, AppError> {
        let client = redis::Client::open(config.url.as_str())?;
        let manager = ConnectionManager::new(client).await?;

        tracing::info!("Redis connection manager initialized");
        Ok(Self { manager })
    }

    async fn ping(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis ping failed: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl RevocationLedger for RedisService {
    async fn revoke(&self, fingerprint: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = format!("revoked:{}", fingerprint);
        conn.set_ex::<_, _, ()>(key, "revoked", ttl_seconds.max(1) as u64)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to write revocation entry: {}", e))?;
        Ok(())
    }

    async fn is_revoked(&self, fingerprint: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = format!("revoked:{}", fingerprint);
        let exists: bool = conn
            .exists(key)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check revocation entry: {}", e))?;
        Ok(exists)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.ping().await
    }
}

#[async_trait]
impl RateLimitStore for RedisService {
    async fn record_and_count(&self, key: &str, now_ms: i64) -> Result<u64, anyhow::Error> {
        let mut conn = self.manager.clone();

        // Member is unique per request so same-millisecond hits all count.
        let member = format!("{}-{}", now_ms, Uuid::new_v4());
        let window_start = now_ms - WINDOW_MS;

        let (_removed, _added, count, _expired): (i64, i64, u64, i64) = redis::pipe()
            .atomic()
            .zrembyscore(key, 0, window_start)
            .zadd(key, member, now_ms)
            .zcard(key)
            .expire(key, KEY_EXPIRY_SECONDS)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Rate limit window update failed: {}", e))?;

        Ok(count)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.ping().await
    }
}
