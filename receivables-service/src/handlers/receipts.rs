//! Receipt issuer endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{MarkReceiptSentRequest, ReceiptResponse};
use crate::middleware::TenantContext;
use crate::models::format_receipt_message;
use crate::AppState;

/// Issue (or fetch) the receipt for a payment. Calling this twice for
/// the same payment returns the same receipt.
#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn issue_receipt(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let receipt = state
        .db
        .get_or_create_receipt(tenant.tenant_id, payment_id)
        .await?;

    let message = format_receipt_message(&receipt);

    Ok(Json(ReceiptResponse { receipt, message }))
}

/// Record that the receipt text was handed off for delivery.
#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant.tenant_id))]
pub async fn mark_receipt_sent(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<Uuid>,
    Json(request): Json<MarkReceiptSentRequest>,
) -> Result<Json<ReceiptResponse>, AppError> {
    request.validate()?;

    let receipt = state
        .db
        .mark_receipt_sent(tenant.tenant_id, receipt_id, &request.via)
        .await?;

    let message = format_receipt_message(&receipt);

    Ok(Json(ReceiptResponse { receipt, message }))
}
