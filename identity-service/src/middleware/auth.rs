use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::services::{token_fingerprint, IdentityError, TokenUse};
use crate::AppState;

/// Authenticated principal, inserted into request extensions by
/// `auth_middleware`. Carries the raw access token so logout can
/// revoke it.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub token: String,
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
}

/// Admission control for protected routes: signature and expiry check,
/// revocation ledger lookup, then a live account check. The ledger
/// lookup fails closed.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header")))?
        .to_string();

    let claims = state
        .codec
        .verify(&token, TokenUse::Access)
        .map_err(IdentityError::from)?;

    let revoked = state
        .ledger
        .is_revoked(&token_fingerprint(&token))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Revocation ledger lookup failed, rejecting request");
            AppError::ServiceUnavailable("revocation-ledger".to_string())
        })?;

    if revoked {
        return Err(IdentityError::TokenRevoked.into());
    }

    // Claims are not enough: the account may have been deactivated
    // since the token was issued.
    let user = state
        .store
        .get_user_by_id(claims.sub)
        .await
        .map_err(IdentityError::Store)?
        .filter(|u| u.is_active)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("User not found or inactive")))?;

    req.extensions_mut().insert(CurrentUser {
        user_id: user.id,
        email: user.email,
        role: user.role,
        token,
    });

    Ok(next.run(req).await)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| {
                AppError::InternalError(anyhow::anyhow!(
                    "CurrentUser missing from request extensions"
                ))
            })
    }
}

/// Role allow-list applied after `auth_middleware`.
#[derive(Clone)]
pub struct RoleGate {
    allowed: Arc<Vec<String>>,
}

impl RoleGate {
    pub fn new(allowed: &[&str]) -> Self {
        Self {
            allowed: Arc::new(allowed.iter().map(|r| r.to_string()).collect()),
        }
    }

    pub fn allows(&self, role: &str) -> bool {
        role_allows(role, &self.allowed)
    }

    pub fn required(&self) -> Vec<String> {
        self.allowed.as_ref().clone()
    }
}

/// Whether `user_role` passes a gate requiring one of `allowed`.
///
/// `superadmin` passes everything. Otherwise an exact match passes,
/// and so does sharing the scope prefix before ':' with an allowed
/// role: `admin:hr` passes a gate listing `admin:compliance`, because
/// scoped admin roles of the same family are interchangeable at the
/// gate and fine-grained checks happen in the handlers.
pub fn role_allows(user_role: &str, allowed: &[String]) -> bool {
    if user_role == "superadmin" {
        return true;
    }
    if allowed.iter().any(|r| r == user_role) {
        return true;
    }

    let prefix = match user_role.split_once(':') {
        Some((prefix, _)) => prefix,
        None => user_role,
    };
    allowed
        .iter()
        .any(|r| r.strip_prefix(prefix).is_some_and(|rest| rest.starts_with(':')))
}

pub async fn role_gate_middleware(
    State(gate): State<RoleGate>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = req.extensions().get::<CurrentUser>().ok_or_else(|| {
        AppError::InternalError(anyhow::anyhow!("Role gate reached without authentication"))
    })?;

    if !gate.allows(&user.role) {
        tracing::warn!(
            user_id = %user.user_id,
            role = %user.role,
            "Role gate denied request"
        );
        return Err(IdentityError::InsufficientRole(gate.required()).into());
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowed(roles: &[&str]) -> Vec<String> {
        roles.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_superadmin_passes_any_gate() {
        assert!(role_allows("superadmin", &allowed(&["admin:hr"])));
        assert!(role_allows("superadmin", &allowed(&["employee"])));
        assert!(role_allows("superadmin", &allowed(&[])));
    }

    #[test]
    fn test_exact_match_passes() {
        assert!(role_allows("employee", &allowed(&["employee", "manager"])));
        assert!(role_allows("admin:hr", &allowed(&["admin:hr"])));
    }

    #[test]
    fn test_scope_prefix_match_passes() {
        assert!(role_allows("admin:hr", &allowed(&["admin:compliance"])));
        assert!(role_allows("admin:compliance", &allowed(&["admin:hr"])));
    }

    #[test]
    fn test_unrelated_role_denied() {
        assert!(!role_allows("employee", &allowed(&["admin:hr"])));
        assert!(!role_allows("manager", &allowed(&["admin:compliance"])));
        assert!(!role_allows("admin:hr", &allowed(&["employee"])));
    }

    #[test]
    fn test_unscoped_role_matches_scoped_family() {
        assert!(role_allows("admin", &allowed(&["admin:hr"])));
        assert!(!role_allows("admin:hr", &allowed(&["admin"])));
    }
}
