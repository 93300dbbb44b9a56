//! Aging report and collection alerts.

use axum::{
    extract::{Query, State},
    Json,
};
use service_core::error::AppError;

use crate::dtos::{AgingQuery, AgingResponse};
use crate::middleware::TenantContext;
use crate::models::build_report;
use crate::AppState;

/// Aging report over every open commitment for the tenant, bucketed
/// around the reporting date.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn aging_report(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<AgingQuery>,
) -> Result<Json<AgingResponse>, AppError> {
    let as_of = query
        .as_of
        .unwrap_or_else(|| chrono::Utc::now().date_naive());

    let open = state.db.list_open_commitments(tenant.tenant_id).await?;
    let report = build_report(&open, as_of);

    Ok(Json(AgingResponse { report }))
}
