use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::TokenConfig;
use crate::models::User;
use crate::services::IdentityError;

/// Token lifecycle phase a credential is valid for. Access tokens hit
/// protected routes, refresh tokens only the refresh endpoint, and
/// mfa_pending tokens only the MFA completion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenUse {
    Access,
    Refresh,
    MfaPending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    pub email: String,
    pub role: String,
    pub token_use: TokenUse,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token signature invalid")]
    BadSignature,
    #[error("token malformed")]
    Malformed,
}

impl From<TokenError> for IdentityError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => IdentityError::TokenExpired,
            TokenError::BadSignature | TokenError::Malformed => IdentityError::TokenInvalid,
        }
    }
}

/// Stateless HS256 codec for the three token kinds the service issues.
#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
    mfa_token_expiry_minutes: i64,
}

impl TokenCodec {
    pub fn new(config: &TokenConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.signing_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.signing_secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
            mfa_token_expiry_minutes: config.mfa_token_expiry_minutes,
        }
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String, anyhow::Error> {
        self.issue(user, TokenUse::Access, Duration::minutes(self.access_token_expiry_minutes))
    }

    pub fn issue_refresh_token(&self, user: &User) -> Result<String, anyhow::Error> {
        self.issue(user, TokenUse::Refresh, Duration::days(self.refresh_token_expiry_days))
    }

    /// Short-lived token bridging password verification and the MFA
    /// challenge. Grants no access on its own.
    pub fn issue_mfa_pending_token(&self, user: &User) -> Result<String, anyhow::Error> {
        self.issue(
            user,
            TokenUse::MfaPending,
            Duration::minutes(self.mfa_token_expiry_minutes),
        )
    }

    fn issue(&self, user: &User, token_use: TokenUse, ttl: Duration) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            token_use,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
    }

    /// Validate signature and expiry, and check the token was issued for
    /// the expected use. A valid token of the wrong use is rejected as
    /// malformed rather than expired.
    pub fn verify(&self, token: &str, expected_use: TokenUse) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(map_jwt_error)?;

        if data.claims.token_use != expected_use {
            return Err(TokenError::Malformed);
        }

        Ok(data.claims)
    }

    /// Decode a token for revocation bookkeeping. The signature must
    /// check out but an already-expired token is still accepted, so its
    /// remaining lifetime can be computed.
    pub fn decode_for_revocation(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(map_jwt_error)?;

        Ok(data.claims)
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::BadSignature,
        _ => TokenError::Malformed,
    }
}
