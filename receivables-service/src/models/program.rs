//! Program catalog model: static reference data, lookup only.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Academic program offered by an institution.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Program {
    pub program_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    /// Full price of the program, fixed per tenant catalog entry.
    pub total_value: Decimal,
    /// Number of module installments the program is paid in.
    pub modules_count: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for creating a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProgram {
    pub tenant_id: Uuid,
    pub name: String,
    pub total_value: Decimal,
    pub modules_count: i32,
}
