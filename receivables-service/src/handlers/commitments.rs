//! Commitment scheduler endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::RescheduleCommitmentRequest;
use crate::middleware::TenantContext;
use crate::models::Commitment;
use crate::AppState;

#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn get_commitment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(commitment_id): Path<Uuid>,
) -> Result<Json<Commitment>, AppError> {
    let commitment = state
        .db
        .get_commitment(tenant.tenant_id, commitment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Commitment not found")))?;

    Ok(Json(commitment))
}

/// Full payment plan for an enrollment, paid history included.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn list_commitments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<Vec<Commitment>>, AppError> {
    let commitments = state
        .db
        .list_commitments(tenant.tenant_id, enrollment_id)
        .await?;

    Ok(Json(commitments))
}

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant.tenant_id))]
pub async fn reschedule_commitment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(commitment_id): Path<Uuid>,
    Json(request): Json<RescheduleCommitmentRequest>,
) -> Result<Json<Commitment>, AppError> {
    request.validate()?;

    let commitment = state
        .db
        .reschedule_commitment(
            tenant.tenant_id,
            commitment_id,
            request.new_date,
            request.comment.as_deref(),
        )
        .await?;

    Ok(Json(commitment))
}
