use axum::{extract::State, http::StatusCode, Json};
use service_core::error::AppError;

use crate::dtos::auth::{
    LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, RegisterRequest,
    RegisterResponse, ValidateResponse,
};
use crate::dtos::MessageResponse;
use crate::middleware::{ClientIp, CurrentUser};
use crate::models::UserResponse;
use crate::services::IdentityError;
use crate::utils::validation::ValidatedJson;
use crate::AppState;

pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let outcome = state.tokens.login(&req.email, &req.password, ip).await?;
    Ok(Json(outcome.into()))
}

pub async fn register(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let user = state
        .invites
        .register(&req.email, &req.password, &req.invite_token, ip)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "Account created".to_string(),
            user: UserResponse::from(user),
        }),
    ))
}

pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<RefreshResponse>, AppError> {
    let pair = state.tokens.refresh(&req.refresh_token).await?;

    Ok(Json(RefreshResponse {
        access_token: pair.access_token,
        token_type: pair.token_type,
        expires_in: pair.expires_in,
    }))
}

pub async fn logout(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    user: CurrentUser,
) -> Result<Json<MessageResponse>, AppError> {
    state.tokens.logout(&user.token, user.user_id, ip).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

/// Introspection for sibling services: echoes the authenticated
/// account after the middleware has checked signature, revocation and
/// account status.
pub async fn validate(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<ValidateResponse>, AppError> {
    let account = state
        .store
        .get_user_by_id(user.user_id)
        .await
        .map_err(IdentityError::Store)?
        .ok_or(IdentityError::TokenInvalid)?;

    Ok(Json(ValidateResponse {
        valid: true,
        user: UserResponse::from(account),
    }))
}
