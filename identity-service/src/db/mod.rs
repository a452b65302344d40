use service_core::error::AppError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::{BootstrapConfig, DatabaseConfig};
use crate::services::CredentialStore;
use crate::utils::password::{hash_password, Password};

pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, AppError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;

    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), AppError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;

    tracing::info!("Database migrations applied");
    Ok(())
}

/// Seed the first superadmin account so a fresh deployment can mint
/// invites. Does nothing if the account already exists.
pub async fn seed_superadmin(
    store: &dyn CredentialStore,
    bootstrap: &BootstrapConfig,
) -> Result<(), AppError> {
    let existing = store
        .get_user_by_email(&bootstrap.superadmin_email)
        .await
        .map_err(AppError::DatabaseError)?;

    if existing.is_some() {
        return Ok(());
    }

    let hash = hash_password(&Password::new(bootstrap.superadmin_password.clone()))?;
    let user = store
        .create_user(&bootstrap.superadmin_email, hash.as_str(), "superadmin")
        .await
        .map_err(AppError::DatabaseError)?;

    tracing::info!(user_id = %user.id, "Bootstrap superadmin created");
    Ok(())
}
