use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{Invite, User};

/// Outcome of the transactional invite-consuming account creation.
/// Both race losers are distinguished so the caller can report them
/// accurately.
#[derive(Debug)]
pub enum UserCreation {
    Created(User),
    InviteSpent,
    EmailTaken,
}

/// Persistence contract for accounts and invites. Backed by Postgres in
/// production and an in-memory map in tests.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error>;

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, anyhow::Error>;

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<User, anyhow::Error>;

    /// Create an account and consume its invite in one transaction.
    /// A concurrent registration losing the invite race or the email
    /// uniqueness race creates no account.
    async fn create_user_with_invite(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
        invite_id: Uuid,
    ) -> Result<UserCreation, anyhow::Error>;

    async fn update_last_login(&self, user_id: Uuid) -> Result<(), anyhow::Error>;

    /// Overwrite the account's single refresh token slot. Passing None
    /// clears it.
    async fn update_refresh_token_hash(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
    ) -> Result<(), anyhow::Error>;

    async fn update_mfa_secret_and_codes(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_codes: &[String],
    ) -> Result<(), anyhow::Error>;

    async fn set_mfa_enabled(&self, user_id: Uuid, enabled: bool) -> Result<(), anyhow::Error>;

    /// Remove one backup code if present. The check and removal are a
    /// single statement so a code can never be spent twice.
    async fn remove_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool, anyhow::Error>;

    /// Returns false if no such user exists.
    async fn set_user_active(&self, user_id: Uuid, active: bool) -> Result<bool, anyhow::Error>;

    async fn list_users(&self) -> Result<Vec<User>, anyhow::Error>;

    async fn create_invite(&self, invite: &Invite) -> Result<(), anyhow::Error>;

    async fn get_invite_by_hash_and_email(
        &self,
        token_hash: &str,
        email: &str,
    ) -> Result<Option<Invite>, anyhow::Error>;

    async fn list_invites(&self) -> Result<Vec<Invite>, anyhow::Error>;

    /// Force-expire an unused invite. Returns false if the invite does
    /// not exist or was already used.
    async fn expire_invite(&self, invite_id: Uuid) -> Result<bool, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

const USER_COLUMNS: &str = "id, email, password_hash, role, is_active, mfa_enabled, mfa_secret, \
     backup_codes, refresh_token_hash, last_login, created_at";

/// Postgres-backed credential store.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Postgres unique_violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "23505")
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE lower(email) = lower($1)",
            USER_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<User, anyhow::Error> {
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, role) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user_with_invite(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
        invite_id: Uuid,
    ) -> Result<UserCreation, anyhow::Error> {
        let mut tx = self.pool.begin().await?;

        // The unique index on lower(email) is the authority on email
        // uniqueness. A violation here means a concurrent registration won.
        let inserted = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, role) VALUES ($1, $2, $3) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&mut *tx)
        .await;

        let user = match inserted {
            Ok(user) => user,
            Err(err) if is_unique_violation(&err) => {
                tx.rollback().await?;
                return Ok(UserCreation::EmailTaken);
            }
            Err(err) => return Err(err.into()),
        };

        let consumed =
            sqlx::query("UPDATE invites SET used = TRUE, used_by = $1 WHERE id = $2 AND used = FALSE")
                .bind(user.id)
                .bind(invite_id)
                .execute(&mut *tx)
                .await?;

        if consumed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(UserCreation::InviteSpent);
        }

        tx.commit().await?;
        Ok(UserCreation::Created(user))
    }

    async fn update_last_login(&self, user_id: Uuid) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_refresh_token_hash(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
    ) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET refresh_token_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_mfa_secret_and_codes(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_codes: &[String],
    ) -> Result<(), anyhow::Error> {
        sqlx::query(
            "UPDATE users SET mfa_secret = $2, backup_codes = $3, mfa_enabled = FALSE WHERE id = $1",
        )
        .bind(user_id)
        .bind(secret)
        .bind(backup_codes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_mfa_enabled(&self, user_id: Uuid, enabled: bool) -> Result<(), anyhow::Error> {
        sqlx::query("UPDATE users SET mfa_enabled = $2 WHERE id = $1")
            .bind(user_id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool, anyhow::Error> {
        let result = sqlx::query(
            "UPDATE users SET backup_codes = array_remove(backup_codes, $2) \
             WHERE id = $1 AND $2 = ANY(backup_codes)",
        )
        .bind(user_id)
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn set_user_active(&self, user_id: Uuid, active: bool) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("UPDATE users SET is_active = $2 WHERE id = $1")
            .bind(user_id)
            .bind(active)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self) -> Result<Vec<User>, anyhow::Error> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {} FROM users ORDER BY created_at DESC",
            USER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    async fn create_invite(&self, invite: &Invite) -> Result<(), anyhow::Error> {
        sqlx::query(
            "INSERT INTO invites (id, email, token_hash, role, created_by, used, used_by, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(invite.id)
        .bind(&invite.email)
        .bind(&invite.token_hash)
        .bind(&invite.role)
        .bind(invite.created_by)
        .bind(invite.used)
        .bind(invite.used_by)
        .bind(invite.expires_at)
        .bind(invite.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_invite_by_hash_and_email(
        &self,
        token_hash: &str,
        email: &str,
    ) -> Result<Option<Invite>, anyhow::Error> {
        let invite = sqlx::query_as::<_, Invite>(
            "SELECT id, email, token_hash, role, created_by, used, used_by, expires_at, created_at \
             FROM invites WHERE token_hash = $1 AND lower(email) = lower($2)",
        )
        .bind(token_hash)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invite)
    }

    async fn list_invites(&self) -> Result<Vec<Invite>, anyhow::Error> {
        let invites = sqlx::query_as::<_, Invite>(
            "SELECT id, email, token_hash, role, created_by, used, used_by, expires_at, created_at \
             FROM invites ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(invites)
    }

    async fn expire_invite(&self, invite_id: Uuid) -> Result<bool, anyhow::Error> {
        let result = sqlx::query("UPDATE invites SET expires_at = NOW() WHERE id = $1 AND used = FALSE")
            .bind(invite_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// In-memory credential store for tests and local development.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    users: Mutex<HashMap<Uuid, User>>,
    invites: Mutex<HashMap<Uuid, Invite>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a prebuilt user, for test setup.
    pub fn insert_user(&self, user: User) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(user.id, user);
        }
    }

    fn lock_users(&self) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, User>>, anyhow::Error> {
        self.users
            .lock()
            .map_err(|_| anyhow::anyhow!("user store lock poisoned"))
    }

    fn lock_invites(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<Uuid, Invite>>, anyhow::Error> {
        self.invites
            .lock()
            .map_err(|_| anyhow::anyhow!("invite store lock poisoned"))
    }

    fn build_user(email: &str, password_hash: &str, role: &str) -> User {
        User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role: role.to_string(),
            is_active: true,
            mfa_enabled: false,
            mfa_secret: None,
            backup_codes: vec![],
            refresh_token_hash: None,
            last_login: None,
            created_at: Utc::now(),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, anyhow::Error> {
        let users = self.lock_users()?;
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>, anyhow::Error> {
        Ok(self.lock_users()?.get(&id).cloned())
    }

    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<User, anyhow::Error> {
        let mut users = self.lock_users()?;
        if users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            anyhow::bail!("email already registered: {}", email);
        }
        let user = Self::build_user(email, password_hash, role);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn create_user_with_invite(
        &self,
        email: &str,
        password_hash: &str,
        role: &str,
        invite_id: Uuid,
    ) -> Result<UserCreation, anyhow::Error> {
        let mut users = self.lock_users()?;
        let mut invites = self.lock_invites()?;

        if users.values().any(|u| u.email.eq_ignore_ascii_case(email)) {
            return Ok(UserCreation::EmailTaken);
        }

        let user = Self::build_user(email, password_hash, role);
        match invites.get_mut(&invite_id) {
            Some(invite) if !invite.used => {
                invite.used = true;
                invite.used_by = Some(user.id);
            }
            _ => return Ok(UserCreation::InviteSpent),
        }

        users.insert(user.id, user.clone());
        Ok(UserCreation::Created(user))
    }

    async fn update_last_login(&self, user_id: Uuid) -> Result<(), anyhow::Error> {
        if let Some(user) = self.lock_users()?.get_mut(&user_id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn update_refresh_token_hash(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
    ) -> Result<(), anyhow::Error> {
        if let Some(user) = self.lock_users()?.get_mut(&user_id) {
            user.refresh_token_hash = token_hash.map(String::from);
        }
        Ok(())
    }

    async fn update_mfa_secret_and_codes(
        &self,
        user_id: Uuid,
        secret: &str,
        backup_codes: &[String],
    ) -> Result<(), anyhow::Error> {
        if let Some(user) = self.lock_users()?.get_mut(&user_id) {
            user.mfa_secret = Some(secret.to_string());
            user.backup_codes = backup_codes.to_vec();
            user.mfa_enabled = false;
        }
        Ok(())
    }

    async fn set_mfa_enabled(&self, user_id: Uuid, enabled: bool) -> Result<(), anyhow::Error> {
        if let Some(user) = self.lock_users()?.get_mut(&user_id) {
            user.mfa_enabled = enabled;
        }
        Ok(())
    }

    async fn remove_backup_code(&self, user_id: Uuid, code: &str) -> Result<bool, anyhow::Error> {
        let mut users = self.lock_users()?;
        if let Some(user) = users.get_mut(&user_id) {
            if let Some(pos) = user.backup_codes.iter().position(|c| c == code) {
                user.backup_codes.remove(pos);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn set_user_active(&self, user_id: Uuid, active: bool) -> Result<bool, anyhow::Error> {
        let mut users = self.lock_users()?;
        match users.get_mut(&user_id) {
            Some(user) => {
                user.is_active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_users(&self) -> Result<Vec<User>, anyhow::Error> {
        let mut users: Vec<User> = self.lock_users()?.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn create_invite(&self, invite: &Invite) -> Result<(), anyhow::Error> {
        self.lock_invites()?.insert(invite.id, invite.clone());
        Ok(())
    }

    async fn get_invite_by_hash_and_email(
        &self,
        token_hash: &str,
        email: &str,
    ) -> Result<Option<Invite>, anyhow::Error> {
        let invites = self.lock_invites()?;
        Ok(invites
            .values()
            .find(|i| i.token_hash == token_hash && i.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_invites(&self) -> Result<Vec<Invite>, anyhow::Error> {
        let mut invites: Vec<Invite> = self.lock_invites()?.values().cloned().collect();
        invites.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(invites)
    }

    async fn expire_invite(&self, invite_id: Uuid) -> Result<bool, anyhow::Error> {
        let mut invites = self.lock_invites()?;
        match invites.get_mut(&invite_id) {
            Some(invite) if !invite.used => {
                invite.expires_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn invite(email: &str) -> Invite {
        Invite {
            id: Uuid::new_v4(),
            email: email.to_string(),
            token_hash: "hash".to_string(),
            role: "employee".to_string(),
            created_by: None,
            used: false,
            used_by: None,
            expires_at: Utc::now() + Duration::hours(24),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let store = InMemoryCredentialStore::new();
        store.create_user("User@Example.com", "hash", "employee").await.unwrap();

        assert!(store.get_user_by_email("user@example.com").await.unwrap().is_some());
        assert!(store.get_user_by_email("other@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_user_rejects_recased_duplicate_email() {
        let store = InMemoryCredentialStore::new();
        store.create_user("alice@example.com", "hash", "employee").await.unwrap();

        assert!(store
            .create_user("Alice@Example.com", "hash", "employee")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_invite_consumed_exactly_once() {
        let store = InMemoryCredentialStore::new();
        let inv = invite("new@example.com");
        store.create_invite(&inv).await.unwrap();

        let first = store
            .create_user_with_invite("new@example.com", "hash", "employee", inv.id)
            .await
            .unwrap();
        assert!(matches!(first, UserCreation::Created(_)));

        let second = store
            .create_user_with_invite("other@example.com", "hash", "employee", inv.id)
            .await
            .unwrap();
        assert!(matches!(second, UserCreation::InviteSpent));
    }

    #[tokio::test]
    async fn test_invite_registration_loses_email_race() {
        let store = InMemoryCredentialStore::new();
        store.create_user("taken@example.com", "hash", "employee").await.unwrap();

        let inv = invite("Taken@Example.com");
        store.create_invite(&inv).await.unwrap();

        let outcome = store
            .create_user_with_invite("Taken@Example.com", "hash", "employee", inv.id)
            .await
            .unwrap();
        assert!(matches!(outcome, UserCreation::EmailTaken));

        // The invite survives for a corrected retry.
        let stored = store.list_invites().await.unwrap();
        assert!(!stored[0].used);
    }

    #[tokio::test]
    async fn test_backup_code_removed_once() {
        let store = InMemoryCredentialStore::new();
        let user = store.create_user("a@b.com", "hash", "admin").await.unwrap();
        store
            .update_mfa_secret_and_codes(user.id, "SECRET", &["AAAA1111".to_string()])
            .await
            .unwrap();

        assert!(store.remove_backup_code(user.id, "AAAA1111").await.unwrap());
        assert!(!store.remove_backup_code(user.id, "AAAA1111").await.unwrap());
    }

    #[tokio::test]
    async fn test_expire_invite_skips_used() {
        let store = InMemoryCredentialStore::new();
        let inv = invite("x@y.com");
        store.create_invite(&inv).await.unwrap();

        store
            .create_user_with_invite("x@y.com", "hash", "employee", inv.id)
            .await
            .unwrap();
        assert!(!store.expire_invite(inv.id).await.unwrap());
    }
}
