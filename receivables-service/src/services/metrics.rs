//! Prometheus metrics for receivables-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramVec, TextEncoder,
};

/// Payment registration counter (no high-cardinality labels).
pub static PAYMENTS_REGISTERED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "receivables_payments_registered_total",
        "Total number of payments registered",
        &["payment_type", "status"] // matricula/module x ok/error - not tenant_id to avoid cardinality explosion
    )
    .expect("Failed to register payments_registered")
});

/// Receipt sequence allocation retries (collision pressure indicator).
pub static RECEIPT_SEQ_RETRIES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "receivables_receipt_seq_retries_total",
        "Receipt sequence allocation retries after unique-index conflicts",
        &["outcome"] // retried, exhausted
    )
    .expect("Failed to register receipt_seq_retries")
});

/// Receipts issued counter.
pub static RECEIPTS_ISSUED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "receivables_receipts_issued_total",
        "Total number of receipts generated",
        &["origin"] // created, existing, race_refetch
    )
    .expect("Failed to register receipts_issued")
});

/// Error counter for alerting.
pub static ERRORS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "receivables_errors_total",
        "Total number of errors by type",
        &["error_type"] // bad_request, not_found, conflict, validation, internal, unavailable, other
    )
    .expect("Failed to register errors_total")
});

/// Database query duration histogram.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "receivables_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .expect("Failed to register db_query_duration")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&PAYMENTS_REGISTERED);
    Lazy::force(&RECEIPT_SEQ_RETRIES);
    Lazy::force(&RECEIPTS_ISSUED);
    Lazy::force(&ERRORS_TOTAL);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}
