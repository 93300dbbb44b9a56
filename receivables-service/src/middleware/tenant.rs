//! Tenant context middleware for multi-tenancy support.
//!
//! Extracts the institution identity from request headers. These
//! headers are set by the gateway after authenticating the user and
//! validating their tenant membership; every query downstream is
//! scoped by this tenant id.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// Tenant context extracted from request headers.
#[derive(Debug, Clone)]
pub struct TenantContext {
    /// Institution this request operates on behalf of.
    pub tenant_id: Uuid,
    /// Staff user making the request, when the gateway forwards one.
    pub user_id: Option<String>,
}

impl TenantContext {
    pub fn new(tenant_id: Uuid, user_id: Option<String>) -> Self {
        Self { tenant_id, user_id }
    }

    /// Who to attribute a mutation to. Falls back to "system" for
    /// gateway-initiated calls without a user.
    pub fn actor(&self) -> String {
        self.user_id
            .clone()
            .unwrap_or_else(|| "system".to_string())
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get("X-Tenant-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "Missing X-Tenant-ID header (required from gateway)"
                ))
            })?
            .parse::<Uuid>()
            .map_err(|_| {
                AppError::BadRequest(anyhow::anyhow!("X-Tenant-ID header must be a UUID"))
            })?;

        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let span = tracing::Span::current();
        span.record("tenant_id", tenant_id.to_string().as_str());
        if let Some(ref uid) = user_id {
            span.record("user_id", uid.as_str());
        }

        Ok(TenantContext::new(tenant_id, user_id))
    }
}
