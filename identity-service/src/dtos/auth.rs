use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::UserResponse;
use crate::services::{LoginOutcome, TokenPair};

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Login result. Either a full session, or an MFA challenge carrying
/// the short-lived pending token.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
    pub mfa_required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mfa_token: Option<String>,
    #[serde(flatten)]
    pub tokens: Option<TokenPair>,
}

impl From<LoginOutcome> for LoginResponse {
    fn from(outcome: LoginOutcome) -> Self {
        match outcome {
            LoginOutcome::Session { user, tokens } => Self {
                user: UserResponse::from(&user),
                mfa_required: false,
                mfa_token: None,
                tokens: Some(tokens),
            },
            LoginOutcome::MfaChallenge { user, mfa_token } => Self {
                user: UserResponse::from(&user),
                mfa_required: true,
                mfa_token: Some(mfa_token),
                tokens: None,
            },
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 12))]
    pub password: String,
    #[validate(length(min = 1))]
    pub invite_token: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MfaCodeRequest {
    /// 6-digit TOTP code or 8-character backup code.
    #[validate(length(min = 6, max = 8))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MfaAuthenticateRequest {
    #[validate(length(min = 1))]
    pub mfa_token: String,
    #[validate(length(min = 6, max = 8))]
    pub code: String,
}

/// Enrollment material, returned once. The secret is delivered inside
/// the provisioning URI.
#[derive(Debug, Serialize)]
pub struct MfaSetupResponse {
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}
