/// Metrics and telemetry for ClearMarket
///
/// Provides Prometheus-compatible metrics for monitoring:
/// - HTTP request counts and latencies
/// - Ledger transactions by kind
/// - Rejected operations by error code
/// - Peer reviews and background jobs

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder,
    HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // ========== HTTP Metrics ==========

    /// Total HTTP requests by method, path, and status
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    /// HTTP request duration in seconds
    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request latencies in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]
    )
    .unwrap();

    // ========== Ledger Metrics ==========

    /// Committed ledger entries by kind
    pub static ref LEDGER_TRANSACTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "ledger_transactions_total",
        "Total number of committed credit transactions",
        &["kind"]
    )
    .unwrap();

    /// Accounts whose balance disagreed with their ledger at the last audit
    pub static ref LEDGER_DRIFTED_ACCOUNTS: IntGauge = register_int_gauge!(
        "ledger_drifted_accounts",
        "Accounts failing the conservation audit"
    )
    .unwrap();

    // ========== Trust Metrics ==========

    /// Accepted reviews by the reviewee's role
    pub static ref REVIEWS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "reviews_total",
        "Total number of accepted peer reviews",
        &["reviewed_role"]
    )
    .unwrap();

    // ========== Error Metrics ==========

    /// Rejected operations by error code
    pub static ref REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rejections_total",
        "Total number of rejected operations",
        &["code"]
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job runs by job and outcome
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    /// Background job duration in seconds
    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "background_job_duration_seconds",
        "Background job execution time in seconds",
        &["job_type"],
        vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record an HTTP request
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration);
}

/// Record a committed ledger entry
pub fn record_transaction(kind: &str) {
    LEDGER_TRANSACTIONS_TOTAL.with_label_values(&[kind]).inc();
}

/// Record an operation rejected with an error response
pub fn record_rejection(code: &str) {
    REJECTIONS_TOTAL.with_label_values(&[code]).inc();
}

/// Record an accepted review
pub fn record_review(reviewed_role: &str) {
    REVIEWS_TOTAL.with_label_values(&[reviewed_role]).inc();
}

/// Record the number of drifted accounts found by the ledger audit
pub fn record_ledger_drift(accounts: usize) {
    LEDGER_DRIFTED_ACCOUNTS.set(accounts as i64);
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str, duration: f64) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_type])
        .observe(duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_transaction() {
        record_transaction("earned");
        let metrics = render_metrics();
        assert!(metrics.contains("ledger_transactions_total"));
        assert!(metrics.contains("kind=\"earned\""));
    }

    #[test]
    fn test_record_rejection() {
        record_rejection("InsufficientBalance");
        assert!(render_metrics().contains("rejections_total"));
    }

    #[test]
    fn test_record_background_job() {
        record_background_job("ledger_audit", "success", 0.2);
        let metrics = render_metrics();
        assert!(metrics.contains("background_jobs_total"));
        assert!(metrics.contains("background_job_duration_seconds"));
    }

    #[test]
    fn test_ledger_drift_gauge() {
        record_ledger_drift(0);
        assert!(render_metrics().contains("ledger_drifted_accounts"));
    }
}
