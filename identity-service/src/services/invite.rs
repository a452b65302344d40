use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditEvent, Invite, User};
use crate::services::{AuditSink, CredentialStore, IdentityError, UserCreation};
use crate::utils::password::{hash_password, validate_password_policy, Password};

/// Deterministic fingerprint of a raw invite token, used for lookup.
/// The raw token itself is never persisted.
fn invite_token_hash(raw_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_token.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_invite_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Invite-only registration: admins mint single-use invite tokens bound
/// to an email and role, and new accounts can only be created through
/// one.
#[derive(Clone)]
pub struct InviteService {
    store: Arc<dyn CredentialStore>,
    audit: Arc<dyn AuditSink>,
    invite_ttl_hours: i64,
}

impl InviteService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        audit: Arc<dyn AuditSink>,
        invite_ttl_hours: i64,
    ) -> Self {
        Self {
            store,
            audit,
            invite_ttl_hours,
        }
    }

    /// Mint an invite. The raw token is returned exactly once; only its
    /// fingerprint is stored.
    pub async fn create(
        &self,
        email: &str,
        role: &str,
        created_by: Uuid,
        ip: Option<String>,
    ) -> Result<(Invite, String), IdentityError> {
        let raw_token = generate_invite_token();
        let now = Utc::now();

        let invite = Invite {
            id: Uuid::new_v4(),
            email: email.to_string(),
            token_hash: invite_token_hash(&raw_token),
            role: role.to_string(),
            created_by: Some(created_by),
            used: false,
            used_by: None,
            expires_at: now + Duration::hours(self.invite_ttl_hours),
            created_at: now,
        };

        self.store
            .create_invite(&invite)
            .await
            .map_err(IdentityError::Store)?;

        self.audit
            .emit(
                AuditEvent::new("invite_created")
                    .actor(created_by)
                    .target(email)
                    .ip(ip)
                    .detail(serde_json::json!({ "role": role, "invite_id": invite.id })),
            )
            .await;

        Ok((invite, raw_token))
    }

    /// Look up an invite by re-hashing the presented token. Checks the
    /// email binding, single-use flag and expiry, in that order.
    pub async fn validate(&self, raw_token: &str, email: &str) -> Result<Invite, IdentityError> {
        let invite = self
            .store
            .get_invite_by_hash_and_email(&invite_token_hash(raw_token), email)
            .await
            .map_err(IdentityError::Store)?
            .ok_or(IdentityError::InviteNotFound)?;

        if invite.used {
            return Err(IdentityError::InviteAlreadyUsed);
        }
        if invite.is_expired() {
            return Err(IdentityError::InviteExpired);
        }

        Ok(invite)
    }

    /// Register an account against a valid invite. The invite is
    /// consumed in the same transaction that creates the account, so a
    /// concurrent registration with the same invite loses cleanly.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        raw_token: &str,
        ip: Option<String>,
    ) -> Result<User, IdentityError> {
        validate_password_policy(password).map_err(IdentityError::WeakPassword)?;

        let invite = self.validate(raw_token, email).await?;

        if self
            .store
            .get_user_by_email(email)
            .await
            .map_err(IdentityError::Store)?
            .is_some()
        {
            return Err(IdentityError::EmailTaken);
        }

        let password_hash = hash_password(&Password::new(password.to_string()))?;

        let user = match self
            .store
            .create_user_with_invite(email, password_hash.as_str(), &invite.role, invite.id)
            .await
            .map_err(IdentityError::Store)?
        {
            UserCreation::Created(user) => user,
            UserCreation::InviteSpent => return Err(IdentityError::InviteAlreadyUsed),
            UserCreation::EmailTaken => return Err(IdentityError::EmailTaken),
        };

        self.audit
            .emit(
                AuditEvent::new("user_registered")
                    .actor(user.id)
                    .target(email)
                    .ip(ip)
                    .detail(serde_json::json!({ "role": user.role, "invite_id": invite.id })),
            )
            .await;

        Ok(user)
    }

    /// Force-expire an unused invite.
    pub async fn revoke(
        &self,
        invite_id: Uuid,
        actor: Uuid,
        ip: Option<String>,
    ) -> Result<bool, IdentityError> {
        let revoked = self
            .store
            .expire_invite(invite_id)
            .await
            .map_err(IdentityError::Store)?;

        if revoked {
            self.audit
                .emit(
                    AuditEvent::new("invite_revoked")
                        .actor(actor)
                        .target(invite_id.to_string())
                        .ip(ip),
                )
                .await;
        }

        Ok(revoked)
    }
}
