pub mod audit;
pub mod auth;
pub mod error;
pub mod invite;
pub mod mfa;
pub mod rate_limit;
pub mod redis;
pub mod revocation;
pub mod store;
pub mod token;

pub use audit::{AuditSink, RecordingAuditSink, TracingAuditSink};
pub use auth::{LoginOutcome, TokenPair, TokenService};
pub use error::IdentityError;
pub use invite::InviteService;
pub use mfa::{MfaEnrollment, MfaProvider};
pub use rate_limit::{MockRateLimitStore, RateLimitStore, SlidingWindowLimiter};
pub use redis::RedisService;
pub use revocation::{token_fingerprint, MockLedger, RevocationLedger};
pub use store::{CredentialStore, InMemoryCredentialStore, PgCredentialStore, UserCreation};
pub use token::{Claims, TokenCodec, TokenError, TokenUse};
