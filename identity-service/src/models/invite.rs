use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registration invite. Only the SHA-256 fingerprint of the invite
/// token is stored; the raw token is returned once at creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Invite {
    pub id: Uuid,
    pub email: String,
    pub token_hash: String,
    pub role: String,
    pub created_by: Option<Uuid>,
    pub used: bool,
    pub used_by: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Invite {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Invite view for admin listings. Excludes the token fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteResponse {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub used: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&Invite> for InviteResponse {
    fn from(invite: &Invite) -> Self {
        Self {
            id: invite.id,
            email: invite.email.clone(),
            role: invite.role.clone(),
            used: invite.used,
            expires_at: invite.expires_at,
            created_at: invite.created_at,
        }
    }
}

impl From<Invite> for InviteResponse {
    fn from(invite: Invite) -> Self {
        Self::from(&invite)
    }
}
