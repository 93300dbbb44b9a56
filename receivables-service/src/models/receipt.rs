//! Receipt model: a 1:1 projection of a payment frozen for delivery.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::PaymentMethod;

/// Payment receipt. The snapshot columns are frozen at generation time;
/// only the delivery bookkeeping (`sent_via`, `sent_utc`) mutates later.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_id: Uuid,
    pub tenant_id: Uuid,
    pub payment_id: Uuid,
    pub receipt_number: String,
    pub student_name: String,
    pub program_name: String,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: String,
    pub sent_via: Option<String>,
    pub sent_utc: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

/// Format an amount as thousands-separated integer pesos: `$1.234.567`.
pub fn format_pesos(amount: Decimal) -> String {
    let value = amount.trunc().to_i64().unwrap_or(0);
    let negative = value < 0;
    let digits = value.unsigned_abs().to_string();

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if negative {
        format!("-${}", grouped)
    } else {
        format!("${}", grouped)
    }
}

/// Render the Spanish delivery text for a receipt. Pure function; the
/// WhatsApp/email collaborators consume the result as-is.
pub fn format_receipt_message(receipt: &Receipt) -> String {
    let method = PaymentMethod::from_str(&receipt.method)
        .map(|m| m.label_es())
        .unwrap_or("Otro");

    format!(
        "Recibo de pago {number}\n\
         Estudiante: {student}\n\
         Programa: {program}\n\
         Valor: {amount}\n\
         Fecha: {date}\n\
         Medio de pago: {method}\n\
         Gracias por su pago.",
        number = receipt.receipt_number,
        student = receipt.student_name,
        program = receipt.program_name,
        amount = format_pesos(receipt.amount),
        date = receipt.payment_date.format("%d/%m/%Y"),
        method = method,
    )
}
