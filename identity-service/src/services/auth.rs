use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{AuditEvent, User};
use crate::services::revocation::{
    token_fingerprint, RevocationLedger, MIN_REVOCATION_TTL_SECONDS,
};
use crate::services::token::{TokenCodec, TokenUse};
use crate::services::{AuditSink, CredentialStore, IdentityError, MfaProvider};
use crate::utils::password::{hash_password, verify_password, Password, PasswordHashString};

/// Bearer token pair issued after full authentication.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Outcome of a password login. Admin-class accounts with MFA enrolled
/// get a challenge instead of a session.
pub enum LoginOutcome {
    Session { user: User, tokens: TokenPair },
    MfaChallenge { user: User, mfa_token: String },
}

/// Orchestrates login, MFA step-up, refresh and logout.
#[derive(Clone)]
pub struct TokenService {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    ledger: Arc<dyn RevocationLedger>,
    audit: Arc<dyn AuditSink>,
    mfa: MfaProvider,
    /// Hash verified for unknown emails so lookups and misses take
    /// comparable time.
    dummy_hash: PasswordHashString,
}

impl TokenService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        codec: TokenCodec,
        ledger: Arc<dyn RevocationLedger>,
        audit: Arc<dyn AuditSink>,
        mfa: MfaProvider,
    ) -> Result<Self, anyhow::Error> {
        let dummy_hash = hash_password(&Password::new(Uuid::new_v4().to_string()))?;

        Ok(Self {
            store,
            codec,
            ledger,
            audit,
            mfa,
            dummy_hash,
        })
    }

    /// Check credentials. Unknown email, wrong password and inactive
    /// account all collapse to None so callers cannot distinguish them.
    pub async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<User>, IdentityError> {
        let user = self
            .store
            .get_user_by_email(email)
            .await
            .map_err(IdentityError::Store)?;
        let password = Password::new(password.to_string());

        match user {
            Some(user) => {
                let stored = PasswordHashString::new(user.password_hash.clone());
                if verify_password(&password, &stored) && user.is_active {
                    Ok(Some(user))
                } else {
                    Ok(None)
                }
            }
            None => {
                verify_password(&password, &self.dummy_hash);
                Ok(None)
            }
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        ip: Option<String>,
    ) -> Result<LoginOutcome, IdentityError> {
        let user = match self.authenticate(email, password).await? {
            Some(user) => user,
            None => {
                self.audit
                    .emit(AuditEvent::new("login_failed").target(email).ip(ip))
                    .await;
                return Err(IdentityError::InvalidCredentials);
            }
        };

        if user.is_admin_class() && user.mfa_enabled {
            let mfa_token = self.codec.issue_mfa_pending_token(&user)?;
            self.audit
                .emit(
                    AuditEvent::new("login_mfa_challenge")
                        .actor(user.id)
                        .target(email)
                        .ip(ip),
                )
                .await;
            return Ok(LoginOutcome::MfaChallenge { user, mfa_token });
        }

        self.issue_session(user, ip).await
    }

    /// Finish an MFA step-up login with the pending token from the
    /// password phase plus a TOTP or backup code.
    pub async fn complete_mfa_login(
        &self,
        mfa_token: &str,
        code: &str,
        ip: Option<String>,
    ) -> Result<LoginOutcome, IdentityError> {
        let claims = self.codec.verify(mfa_token, TokenUse::MfaPending)?;

        let user = self
            .store
            .get_user_by_id(claims.sub)
            .await
            .map_err(IdentityError::Store)?
            .ok_or(IdentityError::TokenInvalid)?;

        if !user.is_active {
            return Err(IdentityError::AccountInactive);
        }

        if !self.mfa.verify_code(&user, code).await? {
            self.audit
                .emit(
                    AuditEvent::new("mfa_failed")
                        .actor(user.id)
                        .target(&user.email)
                        .ip(ip),
                )
                .await;
            return Err(IdentityError::MfaCodeInvalid);
        }

        self.issue_session(user, ip).await
    }

    async fn issue_session(
        &self,
        user: User,
        ip: Option<String>,
    ) -> Result<LoginOutcome, IdentityError> {
        let access_token = self.codec.issue_access_token(&user)?;
        let refresh_token = self.codec.issue_refresh_token(&user)?;

        // Single refresh slot per account: a new login rotates out any
        // previously issued refresh token.
        self.store
            .update_refresh_token_hash(user.id, Some(&token_fingerprint(&refresh_token)))
            .await
            .map_err(IdentityError::Store)?;
        self.store
            .update_last_login(user.id)
            .await
            .map_err(IdentityError::Store)?;

        self.audit
            .emit(
                AuditEvent::new("login")
                    .actor(user.id)
                    .target(&user.email)
                    .ip(ip),
            )
            .await;

        let tokens = TokenPair {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
            expires_in: self.codec.access_token_expiry_seconds(),
        };

        Ok(LoginOutcome::Session { user, tokens })
    }

    /// Exchange a refresh token for a fresh access token. The token
    /// must match the account's current refresh slot.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, IdentityError> {
        let claims = self.codec.verify(refresh_token, TokenUse::Refresh)?;

        let user = self
            .store
            .get_user_by_id(claims.sub)
            .await
            .map_err(IdentityError::Store)?
            .ok_or(IdentityError::TokenInvalid)?;

        if !user.is_active {
            return Err(IdentityError::AccountInactive);
        }

        let stored = user
            .refresh_token_hash
            .as_deref()
            .ok_or(IdentityError::TokenInvalid)?;
        if stored != token_fingerprint(refresh_token) {
            return Err(IdentityError::TokenInvalid);
        }

        let access_token = self.codec.issue_access_token(&user)?;

        Ok(TokenPair {
            access_token,
            refresh_token: refresh_token.to_string(),
            token_type: "bearer".to_string(),
            expires_in: self.codec.access_token_expiry_seconds(),
        })
    }

    /// Put a token on the revocation ledger for the rest of its
    /// lifetime, floored so near-expiry tokens still leave a record.
    pub async fn revoke_token(&self, token: &str) -> Result<(), IdentityError> {
        let claims = self.codec.decode_for_revocation(token)?;

        let remaining = claims.exp - Utc::now().timestamp();
        let ttl = remaining.max(MIN_REVOCATION_TTL_SECONDS);

        self.ledger
            .revoke(&token_fingerprint(token), ttl)
            .await
            .map_err(IdentityError::Ledger)
    }

    /// Revoke the presented access token and clear the refresh slot.
    pub async fn logout(
        &self,
        access_token: &str,
        user_id: Uuid,
        ip: Option<String>,
    ) -> Result<(), IdentityError> {
        self.revoke_token(access_token).await?;

        self.store
            .update_refresh_token_hash(user_id, None)
            .await
            .map_err(IdentityError::Store)?;

        self.audit
            .emit(AuditEvent::new("logout").actor(user_id).ip(ip))
            .await;

        Ok(())
    }
}
