//! Database service for receivables-service.
//!
//! All mutating operations run inside a single transaction: a payment,
//! its receipt number, the enrollment balance update, and the
//! commitment advance either all commit or all roll back.

use crate::models::{
    format_receipt_number, installment_amount, receipt_month, BalanceSnapshot, Commitment,
    CommitmentStatus, CreateEnrollment, CreatePayment, CreateProgram, Enrollment,
    ListPaymentsFilter, OpenCommitment, Payment, PaymentCorrection, PaymentType, Program,
    Receipt,
};
use crate::services::metrics::{DB_QUERY_DURATION, RECEIPTS_ISSUED, RECEIPT_SEQ_RETRIES};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Attempts at allocating a receipt sequence before giving up. Two
/// transactions computing the same next number lose to the unique
/// index and retry with a fresh read.
const RECEIPT_ALLOC_ATTEMPTS: u32 = 3;

/// Internal outcome of one register-payment transaction attempt.
enum TxError {
    /// Receipt sequence collided with a concurrent writer; retryable.
    SequenceConflict,
    App(AppError),
}

impl From<AppError> for TxError {
    fn from(e: AppError) -> Self {
        TxError::App(e)
    }
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "receivables-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Program Catalog
    // -------------------------------------------------------------------------

    /// Create a program catalog entry.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, name = %input.name))]
    pub async fn create_program(&self, input: &CreateProgram) -> Result<Program, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_program"])
            .start_timer();

        if input.total_value <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Program total_value must be positive"
            )));
        }
        if input.modules_count <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Program modules_count must be positive"
            )));
        }

        let program = sqlx::query_as::<_, Program>(
            r#"
            INSERT INTO programs (program_id, tenant_id, name, total_value, modules_count)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING program_id, tenant_id, name, total_value, modules_count, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(&input.name)
        .bind(input.total_value)
        .bind(input.modules_count)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Program '{}' already exists for tenant",
                    input.name
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create program: {}", e)),
        })?;

        timer.observe_duration();

        info!(program_id = %program.program_id, "Program created");

        Ok(program)
    }

    /// Get a program by ID for a specific tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, program_id = %program_id))]
    pub async fn get_program(
        &self,
        tenant_id: Uuid,
        program_id: Uuid,
    ) -> Result<Option<Program>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_program"])
            .start_timer();

        let program = sqlx::query_as::<_, Program>(
            r#"
            SELECT program_id, tenant_id, name, total_value, modules_count, created_utc
            FROM programs
            WHERE tenant_id = $1 AND program_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get program: {}", e)))?;

        timer.observe_duration();

        Ok(program)
    }

    /// List programs for a tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_programs(
        &self,
        tenant_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<Program>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_programs"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let programs = sqlx::query_as::<_, Program>(
            r#"
            SELECT program_id, tenant_id, name, total_value, modules_count, created_utc
            FROM programs
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR program_id > $2)
            ORDER BY program_id
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(page_token)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list programs: {}", e)))?;

        timer.observe_duration();

        Ok(programs)
    }

    // -------------------------------------------------------------------------
    // Enrollments
    // -------------------------------------------------------------------------

    /// Create an enrollment at matriculation: inserts the enrollment,
    /// records the matricula payment (with its receipt number) and
    /// seeds commitment #1, all in one transaction.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, program_id = %input.program_id))]
    pub async fn create_enrollment(
        &self,
        input: &CreateEnrollment,
    ) -> Result<(Enrollment, Payment, Option<Commitment>), AppError> {
        if input.matricula.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Matricula amount must be positive"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_enrollment"])
            .start_timer();

        let mut attempt = 0;
        let result = loop {
            attempt += 1;
            match self.try_create_enrollment(input).await {
                Ok(result) => break result,
                Err(TxError::SequenceConflict) if attempt < RECEIPT_ALLOC_ATTEMPTS => {
                    RECEIPT_SEQ_RETRIES.with_label_values(&["retried"]).inc();
                    warn!(attempt, "Receipt sequence conflict on enrollment, retrying");
                }
                Err(TxError::SequenceConflict) => {
                    RECEIPT_SEQ_RETRIES.with_label_values(&["exhausted"]).inc();
                    return Err(AppError::ServiceUnavailable);
                }
                Err(TxError::App(e)) => return Err(e),
            }
        };

        timer.observe_duration();

        info!(
            enrollment_id = %result.0.enrollment_id,
            receipt_number = %result.1.receipt_number,
            "Enrollment created with matricula payment"
        );

        Ok(result)
    }

    async fn try_create_enrollment(
        &self,
        input: &CreateEnrollment,
    ) -> Result<(Enrollment, Payment, Option<Commitment>), TxError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let program = sqlx::query_as::<_, Program>(
            r#"
            SELECT program_id, tenant_id, name, total_value, modules_count, created_utc
            FROM programs
            WHERE tenant_id = $1 AND program_id = $2
            "#,
        )
        .bind(input.tenant_id)
        .bind(input.program_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get program: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Program not found")))?;

        let enrollment = sqlx::query_as::<_, Enrollment>(
            r#"
            INSERT INTO enrollments (
                enrollment_id, tenant_id, program_id, student_name, student_document,
                student_phone, total_value, total_paid, payment_frequency
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING enrollment_id, tenant_id, program_id, student_name, student_document,
                student_phone, total_value, total_paid, payment_frequency, created_utc, updated_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.tenant_id)
        .bind(program.program_id)
        .bind(&input.student_name)
        .bind(&input.student_document)
        .bind(&input.student_phone)
        .bind(program.total_value)
        .bind(input.matricula.amount)
        .bind(input.payment_frequency.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert enrollment: {}", e))
        })?;

        let payment = insert_payment(
            &mut tx,
            &CreatePayment {
                tenant_id: input.tenant_id,
                enrollment_id: enrollment.enrollment_id,
                amount: input.matricula.amount,
                payment_date: input.matricula.payment_date,
                method: input.matricula.method,
                payment_type: PaymentType::Matricula,
                module_number: None,
                reference: input.matricula.reference.clone(),
                comments: None,
                registered_by: input.registered_by.clone(),
            },
        )
        .await?;

        // Matricula seeds the installment plan: commitment #1 one
        // frequency interval after the matricula date. A matricula that
        // already covers the program leaves nothing to schedule.
        let first_amount = installment_amount(
            program.total_value,
            input.matricula.amount,
            program.modules_count,
        );
        let commitment = if first_amount > Decimal::ZERO {
            let due = input
                .payment_frequency
                .next_due_date(input.matricula.payment_date);
            Some(
                insert_commitment(
                    &mut tx,
                    input.tenant_id,
                    enrollment.enrollment_id,
                    1,
                    first_amount,
                    due,
                )
                .await?,
            )
        } else {
            None
        };

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok((enrollment, payment, commitment))
    }

    /// Get an enrollment by ID for a specific tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, enrollment_id = %enrollment_id))]
    pub async fn get_enrollment(
        &self,
        tenant_id: Uuid,
        enrollment_id: Uuid,
    ) -> Result<Option<Enrollment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_enrollment"])
            .start_timer();

        let enrollment = sqlx::query_as::<_, Enrollment>(
            r#"
            SELECT enrollment_id, tenant_id, program_id, student_name, student_document,
                student_phone, total_value, total_paid, payment_frequency, created_utc, updated_utc
            FROM enrollments
            WHERE tenant_id = $1 AND enrollment_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(enrollment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get enrollment: {}", e)))?;

        timer.observe_duration();

        Ok(enrollment)
    }

    /// List enrollments for a tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_enrollments(
        &self,
        tenant_id: Uuid,
        page_size: i32,
        page_token: Option<Uuid>,
    ) -> Result<Vec<Enrollment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_enrollments"])
            .start_timer();

        let limit = page_size.clamp(1, 100) as i64;

        let enrollments = sqlx::query_as::<_, Enrollment>(
            r#"
            SELECT enrollment_id, tenant_id, program_id, student_name, student_document,
                student_phone, total_value, total_paid, payment_frequency, created_utc, updated_utc
            FROM enrollments
            WHERE tenant_id = $1
              AND ($2::uuid IS NULL OR enrollment_id > $2)
            ORDER BY enrollment_id
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(page_token)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list enrollments: {}", e))
        })?;

        timer.observe_duration();

        Ok(enrollments)
    }

    /// Delete an enrollment and everything hanging off it, explicitly,
    /// in one transaction: receipts, payments, commitments, then the
    /// enrollment row. Returns (payments, commitments) deleted.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, enrollment_id = %enrollment_id))]
    pub async fn delete_enrollment_and_dependents(
        &self,
        tenant_id: Uuid,
        enrollment_id: Uuid,
    ) -> Result<(u64, u64), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_enrollment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let exists: Option<Uuid> = sqlx::query_scalar(
            "SELECT enrollment_id FROM enrollments WHERE tenant_id = $1 AND enrollment_id = $2 FOR UPDATE",
        )
        .bind(tenant_id)
        .bind(enrollment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock enrollment: {}", e)))?;

        if exists.is_none() {
            return Err(AppError::NotFound(anyhow::anyhow!("Enrollment not found")));
        }

        sqlx::query(
            r#"
            DELETE FROM receipts
            WHERE tenant_id = $1
              AND payment_id IN (
                  SELECT payment_id FROM payments
                  WHERE tenant_id = $1 AND enrollment_id = $2
              )
            "#,
        )
        .bind(tenant_id)
        .bind(enrollment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete receipts: {}", e)))?;

        let payments = sqlx::query(
            "DELETE FROM payments WHERE tenant_id = $1 AND enrollment_id = $2",
        )
        .bind(tenant_id)
        .bind(enrollment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete payments: {}", e)))?
        .rows_affected();

        let commitments = sqlx::query(
            "DELETE FROM commitments WHERE tenant_id = $1 AND enrollment_id = $2",
        )
        .bind(tenant_id)
        .bind(enrollment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to delete commitments: {}", e))
        })?
        .rows_affected();

        sqlx::query("DELETE FROM enrollments WHERE tenant_id = $1 AND enrollment_id = $2")
            .bind(tenant_id)
            .bind(enrollment_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete enrollment: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            payments_deleted = payments,
            commitments_deleted = commitments,
            "Enrollment deleted with dependents"
        );

        Ok((payments, commitments))
    }

    // -------------------------------------------------------------------------
    // Payment Recorder
    // -------------------------------------------------------------------------

    /// Register a payment: allocate the receipt number, insert the
    /// payment, advance the enrollment balance under a row lock and
    /// settle the matching commitment, atomically. Receipt-sequence
    /// collisions with concurrent writers retry the whole transaction
    /// up to a small bound.
    #[instrument(skip(self, input), fields(tenant_id = %input.tenant_id, enrollment_id = %input.enrollment_id))]
    pub async fn register_payment(
        &self,
        input: &CreatePayment,
    ) -> Result<(Payment, BalanceSnapshot), AppError> {
        if input.amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Payment amount must be positive"
            )));
        }
        if input.payment_type == PaymentType::Module && input.module_number.is_none() {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "Module payments must carry a module number"
            )));
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["register_payment"])
            .start_timer();

        let mut attempt = 0;
        let (payment, balance) = loop {
            attempt += 1;
            match self.try_register_payment(input).await {
                Ok(result) => break result,
                Err(TxError::SequenceConflict) if attempt < RECEIPT_ALLOC_ATTEMPTS => {
                    RECEIPT_SEQ_RETRIES.with_label_values(&["retried"]).inc();
                    warn!(attempt, "Receipt sequence conflict, retrying");
                }
                Err(TxError::SequenceConflict) => {
                    RECEIPT_SEQ_RETRIES.with_label_values(&["exhausted"]).inc();
                    return Err(AppError::ServiceUnavailable);
                }
                Err(TxError::App(e)) => return Err(e),
            }
        };

        timer.observe_duration();

        info!(
            payment_id = %payment.payment_id,
            receipt_number = %payment.receipt_number,
            amount = %payment.amount,
            total_paid = %balance.total_paid,
            "Payment registered"
        );

        Ok((payment, balance))
    }

    async fn try_register_payment(
        &self,
        input: &CreatePayment,
    ) -> Result<(Payment, BalanceSnapshot), TxError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        // Row lock serializes concurrent payments on the same
        // enrollment so total_paid never loses an update.
        let enrollment = sqlx::query_as::<_, Enrollment>(
            r#"
            SELECT enrollment_id, tenant_id, program_id, student_name, student_document,
                student_phone, total_value, total_paid, payment_frequency, created_utc, updated_utc
            FROM enrollments
            WHERE tenant_id = $1 AND enrollment_id = $2
            FOR UPDATE
            "#,
        )
        .bind(input.tenant_id)
        .bind(input.enrollment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock enrollment: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Enrollment not found")))?;

        let modules_count: i32 = sqlx::query_scalar(
            "SELECT modules_count FROM programs WHERE tenant_id = $1 AND program_id = $2",
        )
        .bind(input.tenant_id)
        .bind(enrollment.program_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get program: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Program not found")))?;

        if let Some(module) = input.module_number {
            if module < 1 || module > modules_count {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Module number {} out of range 1..={}",
                    module,
                    modules_count
                ))
                .into());
            }
        }

        let payment = insert_payment(&mut tx, input).await?;

        let updated = sqlx::query_as::<_, Enrollment>(
            r#"
            UPDATE enrollments
            SET total_paid = total_paid + $3, updated_utc = NOW()
            WHERE tenant_id = $1 AND enrollment_id = $2
            RETURNING enrollment_id, tenant_id, program_id, student_name, student_document,
                student_phone, total_value, total_paid, payment_frequency, created_utc, updated_utc
            "#,
        )
        .bind(input.tenant_id)
        .bind(input.enrollment_id)
        .bind(input.amount)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to update balance: {}", e))
        })?;

        // Matricula payments never match a commitment; they seeded the
        // plan at enrollment time.
        if input.payment_type == PaymentType::Module {
            advance_commitment(&mut tx, &enrollment, modules_count, &payment).await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok((payment, BalanceSnapshot::from(&updated)))
    }

    /// Get a payment by ID for a specific tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn get_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, enrollment_id, amount, payment_date, method,
                payment_type, module_number, reference, comments, receipt_month, receipt_seq,
                receipt_number, registered_by, created_utc
            FROM payments
            WHERE tenant_id = $1 AND payment_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    /// List payments with optional date-range and method filters (the
    /// export feed).
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_payments(
        &self,
        tenant_id: Uuid,
        filter: &ListPaymentsFilter,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let limit = filter.page_size.clamp(1, 100) as i64;

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, tenant_id, enrollment_id, amount, payment_date, method,
                payment_type, module_number, reference, comments, receipt_month, receipt_seq,
                receipt_number, registered_by, created_utc
            FROM payments
            WHERE tenant_id = $1
              AND ($2::date IS NULL OR payment_date >= $2)
              AND ($3::date IS NULL OR payment_date <= $3)
              AND ($4::varchar IS NULL OR method = $4)
              AND ($5::uuid IS NULL OR enrollment_id = $5)
              AND ($6::uuid IS NULL OR payment_id > $6)
            ORDER BY payment_id
            LIMIT $7
            "#,
        )
        .bind(tenant_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(filter.method.map(|m| m.as_str()))
        .bind(filter.enrollment_id)
        .bind(filter.page_token)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list payments: {}", e)))?;

        timer.observe_duration();

        Ok(payments)
    }

    /// Post-hoc correction of a payment record. Deliberately does NOT
    /// touch the enrollment balance; an amount edit leaves the cached
    /// balance as registered.
    #[instrument(skip(self, correction), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn correct_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
        correction: &PaymentCorrection,
    ) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["correct_payment"])
            .start_timer();

        if let Some(amount) = correction.amount {
            if amount <= Decimal::ZERO {
                return Err(AppError::BadRequest(anyhow::anyhow!(
                    "Payment amount must be positive"
                )));
            }
        }

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            UPDATE payments
            SET amount = COALESCE($3, amount),
                payment_date = COALESCE($4, payment_date),
                method = COALESCE($5, method),
                reference = COALESCE($6, reference),
                comments = COALESCE($7, comments)
            WHERE tenant_id = $1 AND payment_id = $2
            RETURNING payment_id, tenant_id, enrollment_id, amount, payment_date, method,
                payment_type, module_number, reference, comments, receipt_month, receipt_seq,
                receipt_number, registered_by, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(payment_id)
        .bind(correction.amount)
        .bind(correction.payment_date)
        .bind(correction.method.map(|m| m.as_str()))
        .bind(&correction.reference)
        .bind(&correction.comments)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to correct payment: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        timer.observe_duration();

        info!(payment_id = %payment.payment_id, "Payment corrected (balance untouched)");

        Ok(payment)
    }

    // -------------------------------------------------------------------------
    // Commitment Scheduler
    // -------------------------------------------------------------------------

    /// List commitments for an enrollment, full history, oldest module first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, enrollment_id = %enrollment_id))]
    pub async fn list_commitments(
        &self,
        tenant_id: Uuid,
        enrollment_id: Uuid,
    ) -> Result<Vec<Commitment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_commitments"])
            .start_timer();

        let commitments = sqlx::query_as::<_, Commitment>(
            r#"
            SELECT commitment_id, tenant_id, enrollment_id, module_number, amount,
                scheduled_date, rescheduled_date, status, comments, created_utc, updated_utc
            FROM commitments
            WHERE tenant_id = $1 AND enrollment_id = $2
            ORDER BY module_number, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(enrollment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list commitments: {}", e))
        })?;

        timer.observe_duration();

        Ok(commitments)
    }

    /// Get a commitment by ID for a specific tenant.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, commitment_id = %commitment_id))]
    pub async fn get_commitment(
        &self,
        tenant_id: Uuid,
        commitment_id: Uuid,
    ) -> Result<Option<Commitment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_commitment"])
            .start_timer();

        let commitment = sqlx::query_as::<_, Commitment>(
            r#"
            SELECT commitment_id, tenant_id, enrollment_id, module_number, amount,
                scheduled_date, rescheduled_date, status, comments, created_utc, updated_utc
            FROM commitments
            WHERE tenant_id = $1 AND commitment_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(commitment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get commitment: {}", e)))?;

        timer.observe_duration();

        Ok(commitment)
    }

    /// Reschedule a commitment to a new date. Paid commitments are
    /// terminal and refuse the move, leaving the row unchanged.
    #[instrument(skip(self, comment), fields(tenant_id = %tenant_id, commitment_id = %commitment_id))]
    pub async fn reschedule_commitment(
        &self,
        tenant_id: Uuid,
        commitment_id: Uuid,
        new_date: NaiveDate,
        comment: Option<&str>,
    ) -> Result<Commitment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["reschedule_commitment"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let current = sqlx::query_as::<_, Commitment>(
            r#"
            SELECT commitment_id, tenant_id, enrollment_id, module_number, amount,
                scheduled_date, rescheduled_date, status, comments, created_utc, updated_utc
            FROM commitments
            WHERE tenant_id = $1 AND commitment_id = $2
            FOR UPDATE
            "#,
        )
        .bind(tenant_id)
        .bind(commitment_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to lock commitment: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Commitment not found")))?;

        if !current
            .parsed_status()
            .can_transition_to(CommitmentStatus::Rescheduled)
        {
            return Err(AppError::InvalidState(anyhow::anyhow!(
                "Commitment {} is already paid and cannot be rescheduled",
                commitment_id
            )));
        }

        let comments = match (current.comments.as_deref(), comment) {
            (Some(existing), Some(new)) => Some(format!("{}\n{}", existing, new)),
            (None, Some(new)) => Some(new.to_string()),
            (existing, None) => existing.map(|s| s.to_string()),
        };

        let updated = sqlx::query_as::<_, Commitment>(
            r#"
            UPDATE commitments
            SET status = 'rescheduled', rescheduled_date = $3, comments = $4, updated_utc = NOW()
            WHERE tenant_id = $1 AND commitment_id = $2
            RETURNING commitment_id, tenant_id, enrollment_id, module_number, amount,
                scheduled_date, rescheduled_date, status, comments, created_utc, updated_utc
            "#,
        )
        .bind(tenant_id)
        .bind(commitment_id)
        .bind(new_date)
        .bind(&comments)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to reschedule commitment: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        info!(
            commitment_id = %updated.commitment_id,
            new_date = %new_date,
            "Commitment rescheduled"
        );

        Ok(updated)
    }

    // -------------------------------------------------------------------------
    // Aging feed
    // -------------------------------------------------------------------------

    /// All open (non-paid) commitments for a tenant joined with the
    /// enrollment identity the alert needs. The aging report itself is
    /// computed in memory; see models::build_report.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_open_commitments(
        &self,
        tenant_id: Uuid,
    ) -> Result<Vec<OpenCommitment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_open_commitments"])
            .start_timer();

        let commitments = sqlx::query_as::<_, OpenCommitment>(
            r#"
            SELECT c.commitment_id, c.enrollment_id, e.student_name, e.student_phone,
                c.module_number, c.amount, c.scheduled_date, c.rescheduled_date, c.status
            FROM commitments c
            JOIN enrollments e
              ON e.tenant_id = c.tenant_id AND e.enrollment_id = c.enrollment_id
            WHERE c.tenant_id = $1 AND c.status <> 'paid'
            ORDER BY COALESCE(c.rescheduled_date, c.scheduled_date), c.commitment_id
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to list open commitments: {}", e))
        })?;

        timer.observe_duration();

        Ok(commitments)
    }

    // -------------------------------------------------------------------------
    // Receipt Issuer
    // -------------------------------------------------------------------------

    /// Idempotent receipt generation: return the existing receipt, or
    /// create one from the payment snapshot. Concurrent calls contend
    /// on the unique payment_id index; the loser re-fetches the
    /// winner's row.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, payment_id = %payment_id))]
    pub async fn get_or_create_receipt(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Receipt, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_or_create_receipt"])
            .start_timer();

        if let Some(existing) = self.find_receipt_by_payment(tenant_id, payment_id).await? {
            RECEIPTS_ISSUED.with_label_values(&["existing"]).inc();
            timer.observe_duration();
            return Ok(existing);
        }

        // Snapshot the payment with enrollment/student identity as of now.
        let snapshot: Option<(String, Decimal, NaiveDate, String, String, String)> =
            sqlx::query_as(
                r#"
                SELECT p.receipt_number, p.amount, p.payment_date, p.method,
                    e.student_name, pr.name
                FROM payments p
                JOIN enrollments e
                  ON e.tenant_id = p.tenant_id AND e.enrollment_id = p.enrollment_id
                JOIN programs pr
                  ON pr.tenant_id = e.tenant_id AND pr.program_id = e.program_id
                WHERE p.tenant_id = $1 AND p.payment_id = $2
                "#,
            )
            .bind(tenant_id)
            .bind(payment_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to snapshot payment: {}", e))
            })?;

        let (receipt_number, amount, payment_date, method, student_name, program_name) =
            snapshot.ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Payment not found")))?;

        let inserted = sqlx::query_as::<_, Receipt>(
            r#"
            INSERT INTO receipts (
                receipt_id, tenant_id, payment_id, receipt_number, student_name,
                program_name, amount, payment_date, method
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING receipt_id, tenant_id, payment_id, receipt_number, student_name,
                program_name, amount, payment_date, method, sent_via, sent_utc, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(payment_id)
        .bind(&receipt_number)
        .bind(&student_name)
        .bind(&program_name)
        .bind(amount)
        .bind(payment_date)
        .bind(&method)
        .fetch_one(&self.pool)
        .await;

        let receipt = match inserted {
            Ok(receipt) => {
                RECEIPTS_ISSUED.with_label_values(&["created"]).inc();
                receipt
            }
            Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
                // Concurrent call won the insert; the receipt exists now.
                RECEIPTS_ISSUED.with_label_values(&["race_refetch"]).inc();
                self.find_receipt_by_payment(tenant_id, payment_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::DatabaseError(anyhow::anyhow!(
                            "Receipt vanished after unique violation"
                        ))
                    })?
            }
            Err(e) => {
                return Err(AppError::DatabaseError(anyhow::anyhow!(
                    "Failed to create receipt: {}",
                    e
                )));
            }
        };

        timer.observe_duration();

        Ok(receipt)
    }

    async fn find_receipt_by_payment(
        &self,
        tenant_id: Uuid,
        payment_id: Uuid,
    ) -> Result<Option<Receipt>, AppError> {
        let receipt = sqlx::query_as::<_, Receipt>(
            r#"
            SELECT receipt_id, tenant_id, payment_id, receipt_number, student_name,
                program_name, amount, payment_date, method, sent_via, sent_utc, created_utc
            FROM receipts
            WHERE tenant_id = $1 AND payment_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get receipt: {}", e)))?;

        Ok(receipt)
    }

    /// Record that a receipt was handed to a delivery collaborator.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, receipt_id = %receipt_id))]
    pub async fn mark_receipt_sent(
        &self,
        tenant_id: Uuid,
        receipt_id: Uuid,
        via: &str,
    ) -> Result<Receipt, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["mark_receipt_sent"])
            .start_timer();

        let receipt = sqlx::query_as::<_, Receipt>(
            r#"
            UPDATE receipts
            SET sent_via = $3, sent_utc = NOW()
            WHERE tenant_id = $1 AND receipt_id = $2
            RETURNING receipt_id, tenant_id, payment_id, receipt_number, student_name,
                program_name, amount, payment_date, method, sent_via, sent_utc, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(receipt_id)
        .bind(via)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to mark receipt sent: {}", e))
        })?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Receipt not found")))?;

        timer.observe_duration();

        Ok(receipt)
    }
}

/// Insert a payment row, allocating the next receipt sequence for the
/// tenant's current month inside the caller's transaction. A unique
/// violation on the sequence index maps to `TxError::SequenceConflict`
/// so the caller can retry the whole transaction.
async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    input: &CreatePayment,
) -> Result<Payment, TxError> {
    let month = receipt_month(chrono::Utc::now().date_naive());

    let seq: i32 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(receipt_seq), 0) + 1 FROM payments WHERE tenant_id = $1 AND receipt_month = $2",
    )
    .bind(input.tenant_id)
    .bind(&month)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| {
        AppError::DatabaseError(anyhow::anyhow!("Failed to allocate receipt sequence: {}", e))
    })?;

    let receipt_number = format_receipt_number(&month, seq);

    let result = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (
            payment_id, tenant_id, enrollment_id, amount, payment_date, method,
            payment_type, module_number, reference, comments, receipt_month,
            receipt_seq, receipt_number, registered_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        RETURNING payment_id, tenant_id, enrollment_id, amount, payment_date, method,
            payment_type, module_number, reference, comments, receipt_month, receipt_seq,
            receipt_number, registered_by, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.tenant_id)
    .bind(input.enrollment_id)
    .bind(input.amount)
    .bind(input.payment_date)
    .bind(input.method.as_str())
    .bind(input.payment_type.as_str())
    .bind(input.module_number)
    .bind(&input.reference)
    .bind(&input.comments)
    .bind(&month)
    .bind(seq)
    .bind(&receipt_number)
    .bind(&input.registered_by)
    .fetch_one(&mut **tx)
    .await;

    match result {
        Ok(payment) => Ok(payment),
        Err(sqlx::Error::Database(ref db_err)) if db_err.is_unique_violation() => {
            Err(TxError::SequenceConflict)
        }
        Err(e) => Err(TxError::App(AppError::DatabaseError(anyhow::anyhow!(
            "Failed to insert payment: {}",
            e
        )))),
    }
}

/// Insert a fresh pending commitment.
async fn insert_commitment(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: Uuid,
    enrollment_id: Uuid,
    module_number: i32,
    amount: Decimal,
    scheduled_date: NaiveDate,
) -> Result<Commitment, AppError> {
    let commitment = sqlx::query_as::<_, Commitment>(
        r#"
        INSERT INTO commitments (
            commitment_id, tenant_id, enrollment_id, module_number, amount,
            scheduled_date, status
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'pending')
        RETURNING commitment_id, tenant_id, enrollment_id, module_number, amount,
            scheduled_date, rescheduled_date, status, comments, created_utc, updated_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(tenant_id)
    .bind(enrollment_id)
    .bind(module_number)
    .bind(amount)
    .bind(scheduled_date)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert commitment: {}", e)))?;

    Ok(commitment)
}

/// Settle the commitment matching a module payment and schedule the
/// next one. The oldest non-paid commitment for the payment's module is
/// marked paid; a commitment for module n+1 is created one frequency
/// interval after it, unless n was the last module of the program.
async fn advance_commitment(
    tx: &mut Transaction<'_, Postgres>,
    enrollment: &Enrollment,
    modules_count: i32,
    payment: &Payment,
) -> Result<Option<Commitment>, AppError> {
    let module = match payment.module_number {
        Some(m) => m,
        None => return Ok(None),
    };

    let matched = sqlx::query_as::<_, Commitment>(
        r#"
        SELECT commitment_id, tenant_id, enrollment_id, module_number, amount,
            scheduled_date, rescheduled_date, status, comments, created_utc, updated_utc
        FROM commitments
        WHERE tenant_id = $1 AND enrollment_id = $2 AND module_number = $3
          AND status <> 'paid'
        ORDER BY scheduled_date, created_utc
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(payment.tenant_id)
    .bind(payment.enrollment_id)
    .bind(module)
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to match commitment: {}", e)))?;

    let Some(commitment) = matched else {
        // Nothing outstanding for this module; the payment still lands.
        return Ok(None);
    };

    if payment.amount < commitment.amount {
        // Partial-is-sufficient: the commitment closes anyway and the
        // deficit is not carried forward. Kept from the observed
        // behavior of the system this replaces; logged for audit.
        warn!(
            commitment_id = %commitment.commitment_id,
            commitment_amount = %commitment.amount,
            payment_amount = %payment.amount,
            "Payment below commitment amount; commitment marked paid anyway"
        );
    }

    sqlx::query(
        "UPDATE commitments SET status = 'paid', updated_utc = NOW() WHERE tenant_id = $1 AND commitment_id = $2",
    )
    .bind(payment.tenant_id)
    .bind(commitment.commitment_id)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to mark commitment paid: {}", e)))?;

    if commitment.module_number >= modules_count {
        return Ok(None);
    }

    let frequency = enrollment.parsed_frequency().ok_or_else(|| {
        AppError::DatabaseError(anyhow::anyhow!(
            "Enrollment {} has unknown payment frequency '{}'",
            enrollment.enrollment_id,
            enrollment.payment_frequency
        ))
    })?;

    let next = insert_commitment(
        tx,
        payment.tenant_id,
        payment.enrollment_id,
        commitment.module_number + 1,
        commitment.amount,
        frequency.next_due_date(commitment.effective_date()),
    )
    .await?;

    info!(
        paid_commitment = %commitment.commitment_id,
        next_commitment = %next.commitment_id,
        next_due = %next.scheduled_date,
        "Commitment advanced"
    );

    Ok(Some(next))
}
