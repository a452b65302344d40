use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    services::{
        InviteService, MfaProvider, PgCredentialStore, RedisService, SlidingWindowLimiter,
        TokenCodec, TokenService, TracingAuditSink,
    },
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration, fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::connect(&config.database).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database initialized");

    let store: Arc<dyn identity_service::services::CredentialStore> =
        Arc::new(PgCredentialStore::new(pool));

    if let Some(bootstrap) = &config.bootstrap {
        db::seed_superadmin(store.as_ref(), bootstrap).await?;
    }

    let redis = Arc::new(RedisService::new(&config.redis).await?);
    let ledger: Arc<dyn identity_service::services::RevocationLedger> = redis.clone();
    let limiter = SlidingWindowLimiter::new(redis.clone());

    let codec = TokenCodec::new(&config.token);
    let audit: Arc<dyn identity_service::services::AuditSink> = Arc::new(TracingAuditSink);

    let mfa = MfaProvider::new(store.clone(), config.mfa.issuer.clone());
    let tokens = TokenService::new(
        store.clone(),
        codec.clone(),
        ledger.clone(),
        audit.clone(),
        mfa.clone(),
    )?;
    let invites = InviteService::new(store.clone(), audit.clone(), config.invite.ttl_hours);
    tracing::info!("Identity services initialized");

    let state = AppState {
        config: config.clone(),
        store,
        codec,
        ledger,
        limiter,
        mfa,
        tokens,
        invites,
        audit,
    };

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
