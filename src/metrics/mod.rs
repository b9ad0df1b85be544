//! Metrics module
//!
//! Prometheus metrics for publishing. Registered in the default registry;
//! [`gather_text`] renders them in the text exposition format.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_TOTAL: CounterVec = register_counter_vec!(
        "mizuchi_publisher_uploads_total",
        "Total number of artifact uploads",
        &["bucket", "status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "mizuchi_publisher_upload_bytes_total",
        "Total bytes of successfully uploaded artifacts"
    ).unwrap();

    pub static ref UPLOAD_DURATION: HistogramVec = register_histogram_vec!(
        "mizuchi_publisher_upload_duration_seconds",
        "Upload duration in seconds",
        &["bucket"],
        vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0]
    ).unwrap();

    // Resolution metrics
    pub static ref REGION_LOOKUPS_TOTAL: CounterVec = register_counter_vec!(
        "mizuchi_publisher_region_lookups_total",
        "Bucket region lookups performed during destination resolution",
        &["status"]
    ).unwrap();
}

/// Final state of one upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    Success,
    Failure,
    Cancelled,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Success => "success",
            UploadStatus::Failure => "failure",
            UploadStatus::Cancelled => "cancelled",
        }
    }
}

/// Record the outcome of an upload
pub fn record_upload(bucket: &str, status: UploadStatus, bytes: u64, duration_secs: f64) {
    UPLOADS_TOTAL
        .with_label_values(&[bucket, status.as_str()])
        .inc();
    UPLOAD_DURATION
        .with_label_values(&[bucket])
        .observe(duration_secs);

    if status == UploadStatus::Success {
        UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
    }
}

/// Record a bucket region lookup
pub fn record_region_lookup(success: bool) {
    let status = if success { "success" } else { "failure" };
    REGION_LOOKUPS_TOTAL.with_label_values(&[status]).inc();
}

/// Render every registered metric in the Prometheus text format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "Failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_upload_success_counts_bytes() {
        let before = UPLOAD_BYTES_TOTAL.get();
        record_upload("metrics-test-bucket", UploadStatus::Success, 1024, 0.5);
        assert!(UPLOAD_BYTES_TOTAL.get() >= before + 1024.0);
    }

    #[test]
    fn test_record_cancelled_upload() {
        let counter = UPLOADS_TOTAL.with_label_values(&["metrics-cancel-bucket", "cancelled"]);
        let before = counter.get();
        record_upload("metrics-cancel-bucket", UploadStatus::Cancelled, 0, 0.1);
        assert_eq!(counter.get(), before + 1.0);
    }

    #[test]
    fn test_gather_text_contains_upload_metrics() {
        record_region_lookup(true);
        record_upload("metrics-gather-bucket", UploadStatus::Failure, 0, 0.2);

        let text = gather_text();
        assert!(text.contains("mizuchi_publisher_uploads_total"));
        assert!(text.contains("mizuchi_publisher_region_lookups_total"));
    }
}
