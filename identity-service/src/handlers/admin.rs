use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::dtos::admin::{CreateInviteRequest, CreateInviteResponse, SetActiveRequest};
use crate::dtos::MessageResponse;
use crate::middleware::{ClientIp, CurrentUser};
use crate::models::{AuditEvent, InviteResponse, UserResponse};
use crate::services::IdentityError;
use crate::utils::validation::ValidatedJson;
use crate::AppState;

pub async fn create_invite(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    user: CurrentUser,
    ValidatedJson(req): ValidatedJson<CreateInviteRequest>,
) -> Result<(StatusCode, Json<CreateInviteResponse>), AppError> {
    let (invite, raw_token) = state
        .invites
        .create(&req.email, &req.role, user.user_id, ip)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateInviteResponse {
            message: "Invite created".to_string(),
            email: invite.email,
            invite_token: raw_token,
            expires_at: invite.expires_at,
        }),
    ))
}

pub async fn list_invites(
    State(state): State<AppState>,
) -> Result<Json<Vec<InviteResponse>>, AppError> {
    let invites = state
        .store
        .list_invites()
        .await
        .map_err(IdentityError::Store)?;

    Ok(Json(invites.iter().map(InviteResponse::from).collect()))
}

pub async fn revoke_invite(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    user: CurrentUser,
    Path(invite_id): Path<Uuid>,
) -> Result<Json<MessageResponse>, AppError> {
    let revoked = state.invites.revoke(invite_id, user.user_id, ip).await?;

    if !revoked {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Invite not found or already used"
        )));
    }

    Ok(Json(MessageResponse::new("Invite revoked")))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, AppError> {
    let users = state
        .store
        .list_users()
        .await
        .map_err(IdentityError::Store)?;

    Ok(Json(users.iter().map(UserResponse::from).collect()))
}

pub async fn set_user_active(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    user: CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(req): Json<SetActiveRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let updated = state
        .store
        .set_user_active(user_id, req.active)
        .await
        .map_err(IdentityError::Store)?;

    if !updated {
        return Err(AppError::NotFound(anyhow::anyhow!("User not found")));
    }

    state
        .audit
        .emit(
            AuditEvent::new(if req.active {
                "user_activated"
            } else {
                "user_deactivated"
            })
            .actor(user.user_id)
            .target(user_id.to_string())
            .ip(ip),
        )
        .await;

    Ok(Json(MessageResponse::new(if req.active {
        "User activated"
    } else {
        "User deactivated"
    })))
}
