use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_models::tenant::TenantId;

use crate::jwt::validate_token;

pub const TENANT_HEADER: &str = "x-tenant-id";

fn bearer_token(request: &Request<Body>) -> Result<&str, AppError> {
    let auth_value = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))
}

/// Validates the staff JWT and stores the `User` in request extensions.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let user = validate_token(bearer_token(&request)?, &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Guards system endpoints called by the external scheduler with the shared secret.
pub async fn cron_secret_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if config.cron_secret.is_empty() {
        return Err(AppError::Auth("Cron secret is not configured".to_string()));
    }

    let presented = bearer_token(&request)?;
    if !constant_time_eq(presented.as_bytes(), config.cron_secret.as_bytes()) {
        return Err(AppError::Auth("Invalid cron secret".to_string()));
    }

    Ok(next.run(request).await)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Staff-only operations.
pub fn require_admin(user: &User) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Auth("Only clinic staff can manage schedules and reminders".to_string()))
    }
}

/// Resolves the tenant of a request. An authenticated user is bound to the
/// tenant claim of their token; only unauthenticated patient-facing calls
/// read the `X-Tenant-Id` header.
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantId);

impl<S> FromRequestParts<S> for Tenant
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            let raw = user
                .tenant_id()
                .ok_or_else(|| AppError::Auth("Token carries no tenant".to_string()))?;
            return TenantId::parse(raw)
                .map(Tenant)
                .ok_or_else(|| AppError::Auth("Token carries an invalid tenant".to_string()));
        }

        let raw = parts
            .headers
            .get(TENANT_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::BadRequest("Missing tenant".to_string()))?;

        TenantId::parse(raw)
            .map(Tenant)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid tenant '{}'", raw)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;
    use serde_json::json;

    async fn resolve(request: Request<()>) -> Result<Tenant, AppError> {
        let (mut parts, _) = request.into_parts();
        Tenant::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_tenant_from_header() {
        let request = Request::builder().header(TENANT_HEADER, "clinic-a").body(()).unwrap();
        let Tenant(tenant) = resolve(request).await.unwrap();
        assert_eq!(tenant.as_str(), "clinic-a");
    }

    #[tokio::test]
    async fn test_user_claim_wins_over_header() {
        let mut request = Request::builder().header(TENANT_HEADER, "clinic-b").body(()).unwrap();
        request.extensions_mut().insert(User {
            id: "staff-1".to_string(),
            email: None,
            role: Some("admin".to_string()),
            app_metadata: Some(json!({ "tenant_id": "clinic-a" })),
            created_at: None,
        });

        let Tenant(tenant) = resolve(request).await.unwrap();
        assert_eq!(tenant.as_str(), "clinic-a");
    }

    #[tokio::test]
    async fn test_user_without_tenant_claim_ignores_header() {
        let mut request = Request::builder().header(TENANT_HEADER, "clinic-b").body(()).unwrap();
        request.extensions_mut().insert(User {
            id: "staff-2".to_string(),
            email: None,
            role: Some("admin".to_string()),
            app_metadata: None,
            created_at: None,
        });

        assert_matches!(resolve(request).await, Err(AppError::Auth(_)));
    }

    #[tokio::test]
    async fn test_missing_tenant_is_rejected() {
        let request = Request::builder().body(()).unwrap();
        assert_matches!(resolve(request).await, Err(AppError::BadRequest(_)));

        let request = Request::builder().header(TENANT_HEADER, "bad tenant").body(()).unwrap();
        assert_matches!(resolve(request).await, Err(AppError::BadRequest(_)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secreT"));
        assert!(!constant_time_eq(b"secret", b"secret-longer"));
    }
}
