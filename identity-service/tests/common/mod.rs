//! Shared harness for identity-service integration tests.
//!
//! Builds the full router against in-memory doubles so tests exercise
//! the real middleware and handlers without Postgres or Redis.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use identity_service::{
    build_router,
    config::{
        DatabaseConfig, Environment, IdentityConfig, InviteConfig, MfaConfig, RateLimitConfig,
        RedisConfig, SecurityConfig, TokenConfig,
    },
    models::User,
    services::{
        CredentialStore, InMemoryCredentialStore, InviteService, MfaProvider, MockLedger,
        MockRateLimitStore, RecordingAuditSink, SlidingWindowLimiter, TokenCodec, TokenService,
    },
    utils::password::{hash_password, Password},
    AppState,
};
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TEST_SIGNING_SECRET: &str = "integration-test-signing-secret-0123456789";

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config { port: 0 },
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "error".to_string(),
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        token: TokenConfig {
            signing_secret: TEST_SIGNING_SECRET.to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            mfa_token_expiry_minutes: 5,
        },
        invite: InviteConfig { ttl_hours: 24 },
        mfa: MfaConfig {
            issuer: "docs-platform".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            login_per_minute: 5,
            register_per_minute: 3,
            mfa_per_minute: 5,
            default_per_minute: 20,
        },
        bootstrap: None,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryCredentialStore>,
    pub ledger: Arc<MockLedger>,
    pub rate_store: Arc<MockRateLimitStore>,
    pub audit: Arc<RecordingAuditSink>,
    pub codec: TokenCodec,
}

pub fn spawn_app() -> TestApp {
    let config = test_config();

    let store = Arc::new(InMemoryCredentialStore::new());
    let ledger = Arc::new(MockLedger::new());
    let rate_store = Arc::new(MockRateLimitStore::new());
    let audit = Arc::new(RecordingAuditSink::new());

    let codec = TokenCodec::new(&config.token);
    let limiter = SlidingWindowLimiter::new(rate_store.clone());
    let mfa = MfaProvider::new(store.clone(), config.mfa.issuer.clone());
    let tokens = TokenService::new(
        store.clone(),
        codec.clone(),
        ledger.clone(),
        audit.clone(),
        mfa.clone(),
    )
    .expect("Failed to build token service");
    let invites = InviteService::new(store.clone(), audit.clone(), config.invite.ttl_hours);

    let state = AppState {
        config,
        store: store.clone(),
        codec: codec.clone(),
        ledger: ledger.clone(),
        limiter,
        mfa,
        tokens,
        invites,
        audit: audit.clone(),
    };

    TestApp {
        router: build_router(state.clone()),
        state,
        store,
        ledger,
        rate_store,
        audit,
        codec,
    }
}

impl TestApp {
    pub async fn seed_user(&self, email: &str, password: &str, role: &str) -> User {
        let hash = hash_password(&Password::new(password.to_string())).expect("hash");
        self.store
            .create_user(email, hash.as_str(), role)
            .await
            .expect("seed user")
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router response");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
        };

        (status, json)
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.request("POST", uri, None, Some(body)).await
    }

    pub async fn post_json_auth(
        &self,
        uri: &str,
        token: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.request("POST", uri, Some(token), Some(body)).await
    }

    pub async fn get_auth(&self, uri: &str, token: &str) -> (StatusCode, serde_json::Value) {
        self.request("GET", uri, Some(token), None).await
    }

    /// Log in and return the response body. Panics if the login is not
    /// accepted.
    pub async fn login(&self, email: &str, password: &str) -> serde_json::Value {
        let (status, body) = self
            .post_json(
                "/auth/login",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body
    }

    pub async fn login_access_token(&self, email: &str, password: &str) -> String {
        self.login(email, password).await["access_token"]
            .as_str()
            .expect("access_token in login response")
            .to_string()
    }
}
