use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::middleware::client_ip::client_ip_from_parts;
use crate::services::{IdentityError, SlidingWindowLimiter, TokenCodec, TokenUse};

/// Per-endpoint rate limit configuration, layered onto individual
/// routes.
#[derive(Clone)]
pub struct RateLimitGate {
    pub limiter: SlidingWindowLimiter,
    pub codec: TokenCodec,
    pub endpoint: &'static str,
    pub limit_per_minute: u32,
}

/// Key the window by authenticated user when a valid access token is
/// presented, otherwise by client address.
fn actor_key(gate: &RateLimitGate, req: &Request) -> String {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    if let Some(token) = bearer {
        if let Ok(claims) = gate.codec.verify(token, TokenUse::Access) {
            return format!("user:{}", claims.sub);
        }
    }

    match client_ip_from_parts(req.headers(), req.extensions()) {
        Some(ip) => format!("ip:{}", ip),
        None => "ip:unknown".to_string(),
    }
}

pub async fn rate_limit_middleware(
    State(gate): State<RateLimitGate>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let actor = actor_key(&gate, &req);

    if !gate
        .limiter
        .allow(&actor, gate.endpoint, gate.limit_per_minute)
        .await
    {
        tracing::warn!(
            endpoint = %gate.endpoint,
            actor = %actor,
            "Rate limit exceeded"
        );
        return Err(IdentityError::RateLimited.into());
    }

    Ok(next.run(req).await)
}
