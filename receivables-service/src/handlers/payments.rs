//! Payment recorder endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    CorrectPaymentRequest, ListPaymentsQuery, RegisterPaymentRequest, RegisterPaymentResponse,
};
use crate::middleware::TenantContext;
use crate::models::{CreatePayment, ListPaymentsFilter, Payment, PaymentCorrection};
use crate::services::metrics::PAYMENTS_REGISTERED;
use crate::AppState;

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant.tenant_id))]
pub async fn register_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<RegisterPaymentRequest>,
) -> Result<(StatusCode, Json<RegisterPaymentResponse>), AppError> {
    request.validate()?;

    let payment_type = request.payment_type;

    let result = state
        .db
        .register_payment(&CreatePayment {
            tenant_id: tenant.tenant_id,
            enrollment_id: request.enrollment_id,
            amount: request.amount,
            payment_date: request.payment_date,
            method: request.method,
            payment_type: request.payment_type,
            module_number: request.module_number,
            reference: request.reference,
            comments: request.comments,
            registered_by: tenant.actor(),
        })
        .await;

    match &result {
        Ok(_) => PAYMENTS_REGISTERED
            .with_label_values(&[payment_type.as_str(), "success"])
            .inc(),
        Err(_) => PAYMENTS_REGISTERED
            .with_label_values(&[payment_type.as_str(), "failed"])
            .inc(),
    }

    let (payment, balance) = result?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterPaymentResponse { payment, balance }),
    ))
}

#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn get_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Payment>, AppError> {
    let payment = state
        .db
        .get_payment(tenant.tenant_id, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

    Ok(Json(payment))
}

/// Export feed: payments filtered by date range and method.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn list_payments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<ListPaymentsQuery>,
) -> Result<Json<Vec<Payment>>, AppError> {
    let payments = state
        .db
        .list_payments(
            tenant.tenant_id,
            &ListPaymentsFilter {
                start_date: query.start_date,
                end_date: query.end_date,
                method: query.method,
                enrollment_id: query.enrollment_id,
                page_size: query.page_size,
                page_token: query.page_token,
            },
        )
        .await?;

    Ok(Json(payments))
}

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant.tenant_id))]
pub async fn correct_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<CorrectPaymentRequest>,
) -> Result<Json<Payment>, AppError> {
    request.validate()?;

    let payment = state
        .db
        .correct_payment(
            tenant.tenant_id,
            payment_id,
            &PaymentCorrection {
                amount: request.amount,
                payment_date: request.payment_date,
                method: request.method,
                reference: request.reference,
                comments: request.comments,
            },
        )
        .await?;

    Ok(Json(payment))
}
