use rand::RngCore;
use serde::Serialize;
use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};
use uuid::Uuid;

use crate::models::User;
use crate::services::{CredentialStore, IdentityError};

pub const BACKUP_CODE_COUNT: usize = 10;

/// Material handed to the user exactly once at enrollment.
#[derive(Debug, Clone, Serialize)]
pub struct MfaEnrollment {
    pub secret: String,
    pub provisioning_uri: String,
    pub backup_codes: Vec<String>,
}

/// TOTP enrollment and verification, with one-time backup codes as a
/// fallback second factor.
#[derive(Clone)]
pub struct MfaProvider {
    store: Arc<dyn CredentialStore>,
    issuer: String,
}

impl MfaProvider {
    pub fn new(store: Arc<dyn CredentialStore>, issuer: String) -> Self {
        Self { store, issuer }
    }

    /// Generate a fresh TOTP secret and backup codes and persist them
    /// with `mfa_enabled` still false. Re-enrollment overwrites any
    /// previous secret and codes.
    pub async fn begin_enrollment(&self, user: &User) -> Result<MfaEnrollment, IdentityError> {
        let secret = Secret::generate_secret().to_encoded().to_string();
        let backup_codes: Vec<String> = (0..BACKUP_CODE_COUNT).map(|_| generate_backup_code()).collect();

        let totp = self.build_totp(&secret, &user.email)?;
        let provisioning_uri = totp.get_url();

        self.store
            .update_mfa_secret_and_codes(user.id, &secret, &backup_codes)
            .await
            .map_err(IdentityError::Store)?;

        Ok(MfaEnrollment {
            secret,
            provisioning_uri,
            backup_codes,
        })
    }

    /// Prove possession of the enrolled authenticator and switch MFA on.
    pub async fn confirm_enrollment(&self, user: &User, code: &str) -> Result<(), IdentityError> {
        let secret = user
            .mfa_secret
            .as_deref()
            .ok_or(IdentityError::MfaNotConfigured)?;

        if !self.check_totp(secret, &user.email, code)? {
            return Err(IdentityError::MfaCodeInvalid);
        }

        self.store
            .set_mfa_enabled(user.id, true)
            .await
            .map_err(IdentityError::Store)
    }

    /// Check a second-factor code at login: first against the TOTP
    /// secret, then against the unused backup codes. A matching backup
    /// code is consumed atomically and cannot be replayed.
    pub async fn verify_code(&self, user: &User, code: &str) -> Result<bool, IdentityError> {
        let secret = match user.mfa_secret.as_deref() {
            Some(secret) => secret,
            // An account flagged for MFA with no enrolled secret is a
            // configuration fault, not a wrong code.
            None if user.mfa_enabled => {
                return Err(IdentityError::MfaUnavailable(
                    "mfa enabled but no secret enrolled".to_string(),
                ))
            }
            None => return Ok(false),
        };

        if self.check_totp(secret, &user.email, code)? {
            return Ok(true);
        }

        self.consume_backup_code(user.id, code).await
    }

    async fn consume_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool, IdentityError> {
        self.store
            .remove_backup_code(user_id, &code.to_uppercase())
            .await
            .map_err(IdentityError::Store)
    }

    fn check_totp(&self, secret: &str, email: &str, code: &str) -> Result<bool, IdentityError> {
        let totp = self.build_totp(secret, email)?;
        totp.check_current(code)
            .map_err(|e| IdentityError::MfaUnavailable(format!("system clock error: {}", e)))
    }

    fn build_totp(&self, secret: &str, email: &str) -> Result<TOTP, IdentityError> {
        let secret_bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| IdentityError::MfaUnavailable(format!("bad TOTP secret: {:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(self.issuer.clone()),
            email.to_string(),
        )
        .map_err(|e| IdentityError::MfaUnavailable(format!("TOTP init failed: {}", e)))
    }
}

fn generate_backup_code() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode_upper(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::InMemoryCredentialStore;

    fn provider() -> (Arc<InMemoryCredentialStore>, MfaProvider) {
        let store = Arc::new(InMemoryCredentialStore::new());
        let provider = MfaProvider::new(store.clone(), "docs-platform".to_string());
        (store, provider)
    }

    async fn admin_user(store: &InMemoryCredentialStore) -> User {
        store
            .create_user("admin@example.com", "$argon2id$test", "admin")
            .await
            .unwrap()
    }

    fn current_code(enrollment: &MfaEnrollment, email: &str) -> String {
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            Secret::Encoded(enrollment.secret.clone()).to_bytes().unwrap(),
            Some("docs-platform".to_string()),
            email.to_string(),
        )
        .unwrap();
        totp.generate_current().unwrap()
    }

    #[tokio::test]
    async fn test_enrollment_and_confirmation() {
        let (store, provider) = provider();
        let user = admin_user(&store).await;

        let enrollment = provider.begin_enrollment(&user).await.unwrap();
        assert_eq!(enrollment.backup_codes.len(), BACKUP_CODE_COUNT);
        for code in &enrollment.backup_codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
        }
        assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));

        // Enrollment is pending until confirmed.
        let pending = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(!pending.mfa_enabled);
        assert!(pending.mfa_secret.is_some());

        let code = current_code(&enrollment, &user.email);
        provider.confirm_enrollment(&pending, &code).await.unwrap();

        let enrolled = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(enrolled.mfa_enabled);
    }

    #[tokio::test]
    async fn test_confirm_with_bad_code_rejected() {
        let (store, provider) = provider();
        let user = admin_user(&store).await;
        provider.begin_enrollment(&user).await.unwrap();

        let pending = store.get_user_by_id(user.id).await.unwrap().unwrap();
        let result = provider.confirm_enrollment(&pending, "000000").await;
        assert!(matches!(result, Err(IdentityError::MfaCodeInvalid)));

        let still_pending = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(!still_pending.mfa_enabled);
    }

    #[tokio::test]
    async fn test_backup_code_single_use() {
        let (store, provider) = provider();
        let user = admin_user(&store).await;
        let enrollment = provider.begin_enrollment(&user).await.unwrap();

        let enrolled = store.get_user_by_id(user.id).await.unwrap().unwrap();
        let backup = enrollment.backup_codes[0].clone();

        assert!(provider.verify_code(&enrolled, &backup).await.unwrap());
        let after = store.get_user_by_id(user.id).await.unwrap().unwrap();
        assert!(!provider.verify_code(&after, &backup).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_without_secret_is_false() {
        let (store, provider) = provider();
        let user = admin_user(&store).await;

        assert!(!provider.verify_code(&user, "123456").await.unwrap());
    }
}
