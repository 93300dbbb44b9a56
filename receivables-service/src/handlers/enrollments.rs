//! Enrollment ledger endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    CreateEnrollmentRequest, CreateEnrollmentResponse, DeleteEnrollmentResponse,
    EnrollmentDetailResponse, PageQuery,
};
use crate::middleware::TenantContext;
use crate::models::{BalanceSnapshot, CreateEnrollment, Enrollment, MatriculaInput};
use crate::services::metrics::PAYMENTS_REGISTERED;
use crate::AppState;

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant.tenant_id))]
pub async fn create_enrollment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateEnrollmentRequest>,
) -> Result<(StatusCode, Json<CreateEnrollmentResponse>), AppError> {
    request.validate()?;

    let (enrollment, matricula_payment, first_commitment) = state
        .db
        .create_enrollment(&CreateEnrollment {
            tenant_id: tenant.tenant_id,
            program_id: request.program_id,
            student_name: request.student_name,
            student_document: request.student_document,
            student_phone: request.student_phone,
            payment_frequency: request.payment_frequency,
            matricula: MatriculaInput {
                amount: request.matricula.amount,
                payment_date: request.matricula.payment_date,
                method: request.matricula.method,
                reference: request.matricula.reference,
            },
            registered_by: tenant.actor(),
        })
        .await?;

    PAYMENTS_REGISTERED
        .with_label_values(&["matricula", "success"])
        .inc();

    Ok((
        StatusCode::CREATED,
        Json(CreateEnrollmentResponse {
            enrollment,
            matricula_payment,
            first_commitment,
        }),
    ))
}

#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn get_enrollment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<EnrollmentDetailResponse>, AppError> {
    let enrollment = state
        .db
        .get_enrollment(tenant.tenant_id, enrollment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Enrollment not found")))?;

    let balance = BalanceSnapshot::from(&enrollment);

    Ok(Json(EnrollmentDetailResponse {
        enrollment,
        balance,
    }))
}

#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn list_enrollments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Enrollment>>, AppError> {
    let enrollments = state
        .db
        .list_enrollments(tenant.tenant_id, query.page_size, query.page_token)
        .await?;

    Ok(Json(enrollments))
}

#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn delete_enrollment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(enrollment_id): Path<Uuid>,
) -> Result<Json<DeleteEnrollmentResponse>, AppError> {
    let (payments_deleted, commitments_deleted) = state
        .db
        .delete_enrollment_and_dependents(tenant.tenant_id, enrollment_id)
        .await?;

    Ok(Json(DeleteEnrollmentResponse {
        payments_deleted,
        commitments_deleted,
    }))
}
