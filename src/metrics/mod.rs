//! Metrics module
//!
//! Prometheus metrics for the upload relay.

pub mod server;

use crate::upload::UploadStage;
use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "uploadr_uploads_total",
        "Total number of uploads",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "uploadr_upload_bytes_total",
        "Total bytes forwarded to the media API"
    ).unwrap();

    pub static ref STAGE_DURATION: HistogramVec = register_histogram_vec!(
        "uploadr_stage_duration_seconds",
        "Time spent per upload stage in seconds",
        &["stage"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "uploadr_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();

    pub static ref CLEANUP_FAILURES: Counter = register_counter!(
        "uploadr_artifact_cleanup_failures_total",
        "Transient artifacts that could not be deleted"
    ).unwrap();
}

/// Record a successful upload
pub fn record_upload_success(bytes: u64) {
    UPLOADS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a failed upload
pub fn record_upload_failure(error_type: &str) {
    UPLOADS_TOTAL.with_label_values(&["failure"]).inc();
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Record how long a stage took
pub fn record_stage_duration(stage: UploadStage, duration_secs: f64) {
    STAGE_DURATION
        .with_label_values(&[stage.as_str()])
        .observe(duration_secs);
}

/// Record an artifact that survived cleanup
pub fn record_cleanup_failure() {
    CLEANUP_FAILURES.inc();
}

/// Record a rejected HTTP request (bad body, unknown route)
pub fn record_request_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}
