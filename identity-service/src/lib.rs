pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::security_headers::security_headers_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::middleware::{
    auth_middleware, rate_limit_middleware, role_gate_middleware, RateLimitGate, RoleGate,
};
use crate::services::{
    AuditSink, CredentialStore, InviteService, MfaProvider, RevocationLedger,
    SlidingWindowLimiter, TokenCodec, TokenService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn CredentialStore>,
    pub codec: TokenCodec,
    pub ledger: Arc<dyn RevocationLedger>,
    pub limiter: SlidingWindowLimiter,
    pub mfa: MfaProvider,
    pub tokens: TokenService,
    pub invites: InviteService,
    pub audit: Arc<dyn AuditSink>,
}

impl AppState {
    fn rate_limit_gate(&self, endpoint: &'static str, limit_per_minute: u32) -> RateLimitGate {
        RateLimitGate {
            limiter: self.limiter.clone(),
            codec: self.codec.clone(),
            endpoint,
            limit_per_minute,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let limits = state.config.rate_limit.clone();

    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.rate_limit_gate("login", limits.login_per_minute),
            rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            state.rate_limit_gate("register", limits.register_per_minute),
            rate_limit_middleware,
        ));

    let mfa_authenticate_route = Router::new()
        .route("/auth/mfa/authenticate", post(handlers::mfa::authenticate))
        .layer(from_fn_with_state(
            state.rate_limit_gate("mfa", limits.mfa_per_minute),
            rate_limit_middleware,
        ));

    let refresh_route = Router::new()
        .route("/auth/refresh", post(handlers::auth::refresh))
        .layer(from_fn_with_state(
            state.rate_limit_gate("refresh", limits.default_per_minute),
            rate_limit_middleware,
        ));

    // Authenticated surface. Layers run bottom-up: authentication
    // before the role gate.
    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/validate", get(handlers::auth::validate))
        .route("/auth/mfa/setup", post(handlers::mfa::setup))
        .route("/auth/mfa/verify", post(handlers::mfa::verify))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/admin/invite", post(handlers::admin::create_invite))
        .route("/admin/invites", get(handlers::admin::list_invites))
        .route(
            "/admin/invites/:invite_id/revoke",
            post(handlers::admin::revoke_invite),
        )
        .route("/admin/users", get(handlers::admin::list_users))
        .route(
            "/admin/users/:user_id/active",
            post(handlers::admin::set_user_active),
        )
        .layer(from_fn_with_state(
            RoleGate::new(&["superadmin"]),
            role_gate_middleware,
        ))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .filter_map(|origin| {
                    origin
                        .parse::<HeaderValue>()
                        .map_err(|e| {
                            tracing::error!(origin = %origin, error = %e, "Invalid CORS origin, skipping");
                            e
                        })
                        .ok()
                })
                .collect::<Vec<HeaderValue>>(),
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .merge(login_route)
        .merge(register_route)
        .merge(mfa_authenticate_route)
        .merge(refresh_route)
        .merge(protected_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

/// Service health check; reports the state of the backing stores.
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Credential store health check failed");
        AppError::ServiceUnavailable("credential-store".to_string())
    })?;

    state.ledger.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Revocation ledger health check failed");
        AppError::ServiceUnavailable("revocation-ledger".to_string())
    })?;

    state.limiter.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Rate limit store health check failed");
        AppError::ServiceUnavailable("rate-limit-store".to_string())
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "checks": {
            "postgres": "up",
            "redis": "up"
        }
    })))
}
