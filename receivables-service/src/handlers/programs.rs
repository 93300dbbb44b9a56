//! Program catalog endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{CreateProgramRequest, PageQuery};
use crate::middleware::TenantContext;
use crate::models::{CreateProgram, Program};
use crate::AppState;

#[tracing::instrument(skip(state, request), fields(tenant_id = %tenant.tenant_id))]
pub async fn create_program(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateProgramRequest>,
) -> Result<(StatusCode, Json<Program>), AppError> {
    request.validate()?;

    let program = state
        .db
        .create_program(&CreateProgram {
            tenant_id: tenant.tenant_id,
            name: request.name,
            total_value: request.total_value,
            modules_count: request.modules_count,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(program)))
}

#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn get_program(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(program_id): Path<Uuid>,
) -> Result<Json<Program>, AppError> {
    let program = state
        .db
        .get_program(tenant.tenant_id, program_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Program not found")))?;

    Ok(Json(program))
}

#[tracing::instrument(skip(state), fields(tenant_id = %tenant.tenant_id))]
pub async fn list_programs(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(query): Query<PageQuery>,
) -> Result<Json<Vec<Program>>, AppError> {
    let programs = state
        .db
        .list_programs(tenant.tenant_id, query.page_size, query.page_token)
        .await?;

    Ok(Json(programs))
}
