use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Minimum time a revocation entry is retained, even for tokens about
/// to expire on their own.
pub const MIN_REVOCATION_TTL_SECONDS: i64 = 3600;

/// SHA-256 fingerprint of a raw token. Revocation entries are keyed by
/// fingerprint so the ledger never stores usable credentials.
pub fn token_fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Shared denylist of revoked tokens, consulted on every authenticated
/// request. Lookups fail closed: if the ledger cannot be reached the
/// request is rejected rather than served with a possibly revoked token.
#[async_trait]
pub trait RevocationLedger: Send + Sync {
    async fn revoke(&self, fingerprint: &str, ttl_seconds: i64) -> Result<(), anyhow::Error>;

    async fn is_revoked(&self, fingerprint: &str) -> Result<bool, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

/// In-memory ledger for tests and local development. Entries never
/// expire; the TTL is recorded but not enforced.
#[derive(Default)]
pub struct MockLedger {
    entries: Mutex<HashMap<String, i64>>,
    unavailable: AtomicBool,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a ledger outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// TTL that was requested when the fingerprint was revoked, if any.
    pub fn ttl_for(&self, fingerprint: &str) -> Option<i64> {
        self.entries.lock().ok()?.get(fingerprint).copied()
    }

    fn check_available(&self) -> Result<(), anyhow::Error> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(anyhow::anyhow!("ledger unavailable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RevocationLedger for MockLedger {
    async fn revoke(&self, fingerprint: &str, ttl_seconds: i64) -> Result<(), anyhow::Error> {
        self.check_available()?;
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("ledger lock poisoned"))?
            .insert(fingerprint.to_string(), ttl_seconds);
        Ok(())
    }

    async fn is_revoked(&self, fingerprint: &str) -> Result<bool, anyhow::Error> {
        self.check_available()?;
        Ok(self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("ledger lock poisoned"))?
            .contains_key(fingerprint))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        self.check_available()
    }
}
