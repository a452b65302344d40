use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A platform account. `backup_codes` holds the unused one-time MFA
/// recovery codes; consuming a code removes it from the array.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub backup_codes: Vec<String>,
    pub refresh_token_hash: Option<String>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Admin-class roles require an MFA challenge at login once enrolled.
    pub fn is_admin_class(&self) -> bool {
        role_is_admin_class(&self.role)
    }
}

pub fn role_is_admin_class(role: &str) -> bool {
    role == "superadmin" || role.starts_with("admin")
}

/// User view safe to return to clients. Never exposes the password hash,
/// MFA secret, backup codes, or refresh token hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub mfa_enabled: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
            is_active: user.is_active,
            mfa_enabled: user.mfa_enabled,
            last_login: user.last_login,
            created_at: user.created_at,
        }
    }
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self::from(&user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(role: &str, secret: Option<&str>, enabled: bool) -> User {
        User {
            id: Uuid::new_v4(),
            email: "user@example.com".to_string(),
            password_hash: "$argon2id$test".to_string(),
            role: role.to_string(),
            is_active: true,
            mfa_enabled: enabled,
            mfa_secret: secret.map(String::from),
            backup_codes: vec![],
            refresh_token_hash: None,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_admin_class_roles() {
        assert!(user_with("superadmin", None, false).is_admin_class());
        assert!(user_with("admin", None, false).is_admin_class());
        assert!(user_with("admin:hr", None, false).is_admin_class());
        assert!(!user_with("employee", None, false).is_admin_class());
        assert!(!user_with("manager", None, false).is_admin_class());
    }
}
