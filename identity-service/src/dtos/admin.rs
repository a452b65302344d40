use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInviteRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub role: String,
}

/// The raw invite token appears here and nowhere else.
#[derive(Debug, Serialize)]
pub struct CreateInviteResponse {
    pub message: String,
    pub email: String,
    pub invite_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}
