use service_core::error::AppError;
use thiserror::Error;

/// Failures surfaced by the identity flows. Converted at the HTTP
/// boundary into generic client-facing responses via `AppError`.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is not active")]
    AccountInactive,

    #[error("token expired")]
    TokenExpired,

    #[error("token invalid")]
    TokenInvalid,

    #[error("token revoked")]
    TokenRevoked,

    #[error("insufficient role, requires one of {0:?}")]
    InsufficientRole(Vec<String>),

    #[error("invite not found")]
    InviteNotFound,

    #[error("invite expired")]
    InviteExpired,

    #[error("invite already used")]
    InviteAlreadyUsed,

    #[error("password policy violation: {0}")]
    WeakPassword(String),

    #[error("email already registered")]
    EmailTaken,

    #[error("mfa code invalid")]
    MfaCodeInvalid,

    #[error("mfa not configured for account")]
    MfaNotConfigured,

    #[error("mfa provider unavailable: {0}")]
    MfaUnavailable(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("credential store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("revocation ledger error: {0}")]
    Ledger(#[source] anyhow::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<IdentityError> for AppError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            IdentityError::AccountInactive => {
                AppError::Unauthorized(anyhow::anyhow!("Account is not active"))
            }
            IdentityError::TokenExpired => {
                AppError::Unauthorized(anyhow::anyhow!("Token has expired"))
            }
            IdentityError::TokenInvalid => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            IdentityError::TokenRevoked => {
                AppError::Unauthorized(anyhow::anyhow!("Token has been revoked"))
            }
            IdentityError::InsufficientRole(required) => AppError::Forbidden(anyhow::anyhow!(
                "Insufficient permissions. Required roles: {}",
                required.join(", ")
            )),
            IdentityError::InviteNotFound => {
                AppError::BadRequest(anyhow::anyhow!("Invalid invite token or email"))
            }
            IdentityError::InviteExpired => {
                AppError::BadRequest(anyhow::anyhow!("Invite token has expired"))
            }
            IdentityError::InviteAlreadyUsed => {
                AppError::BadRequest(anyhow::anyhow!("Invite token has already been used"))
            }
            IdentityError::WeakPassword(reason) => AppError::BadRequest(anyhow::anyhow!(reason)),
            IdentityError::EmailTaken => {
                AppError::Conflict(anyhow::anyhow!("Email is already registered"))
            }
            IdentityError::MfaCodeInvalid => {
                AppError::BadRequest(anyhow::anyhow!("Invalid MFA code"))
            }
            IdentityError::MfaNotConfigured => {
                AppError::BadRequest(anyhow::anyhow!("MFA is not configured for this account"))
            }
            IdentityError::MfaUnavailable(detail) => {
                tracing::error!(detail = %detail, "MFA provider unavailable");
                AppError::ServiceUnavailable("mfa".to_string())
            }
            IdentityError::RateLimited => AppError::TooManyRequests(
                "Too many requests. Please try again later.".to_string(),
                Some(60),
            ),
            IdentityError::Store(err) => AppError::DatabaseError(err),
            IdentityError::Ledger(err) => {
                tracing::error!(error = %err, "Revocation ledger unavailable");
                AppError::ServiceUnavailable("revocation-ledger".to_string())
            }
            IdentityError::Internal(err) => AppError::InternalError(err),
        }
    }
}
