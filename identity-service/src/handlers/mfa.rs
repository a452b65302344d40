use axum::{extract::State, Json};
use service_core::error::AppError;

use crate::dtos::auth::{LoginResponse, MfaAuthenticateRequest, MfaCodeRequest, MfaSetupResponse};
use crate::dtos::MessageResponse;
use crate::middleware::{ClientIp, CurrentUser};
use crate::models::{user::role_is_admin_class, AuditEvent, User};
use crate::services::IdentityError;
use crate::utils::validation::ValidatedJson;
use crate::AppState;

async fn load_account(state: &AppState, user: &CurrentUser) -> Result<User, AppError> {
    Ok(state
        .store
        .get_user_by_id(user.user_id)
        .await
        .map_err(IdentityError::Store)?
        .ok_or(IdentityError::TokenInvalid)?)
}

/// Begin TOTP enrollment. Restricted to admin-class accounts, the only
/// ones subject to step-up at login.
pub async fn setup(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<MfaSetupResponse>, AppError> {
    if !role_is_admin_class(&user.role) {
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "MFA enrollment is only available for admin accounts"
        )));
    }

    let account = load_account(&state, &user).await?;
    let enrollment = state.mfa.begin_enrollment(&account).await?;

    Ok(Json(MfaSetupResponse {
        provisioning_uri: enrollment.provisioning_uri,
        backup_codes: enrollment.backup_codes,
    }))
}

/// Confirm enrollment with a code from the authenticator; flips MFA on.
pub async fn verify(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<MfaCodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let account = load_account(&state, &user).await?;
    state.mfa.confirm_enrollment(&account, &req.code).await?;

    state
        .audit
        .emit(AuditEvent::new("mfa_enabled").actor(user.user_id).ip(ip))
        .await;

    Ok(Json(MessageResponse::new("MFA enabled")))
}

/// Second phase of an MFA login: pending token plus TOTP or backup
/// code in, full session out.
pub async fn authenticate(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ValidatedJson(req): ValidatedJson<MfaAuthenticateRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let outcome = state
        .tokens
        .complete_mfa_login(&req.mfa_token, &req.code, ip)
        .await?;

    Ok(Json(outcome.into()))
}
