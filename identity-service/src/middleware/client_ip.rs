use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::{request::Parts, HeaderMap};
use std::convert::Infallible;
use std::net::SocketAddr;

/// Best-effort client address for audit trails and rate limit keys.
/// Prefers the first `x-forwarded-for` hop, falls back to the socket
/// peer address.
#[derive(Debug, Clone)]
pub struct ClientIp(pub Option<String>);

pub fn client_ip_from_parts(headers: &HeaderMap, parts: &axum::http::Extensions) -> Option<String> {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    {
        return Some(forwarded);
    }

    parts
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip_from_parts(
            &parts.headers,
            &parts.extensions,
        )))
    }
}
