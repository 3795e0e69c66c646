//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `aws_controller_reconciliations_total` - Reconciliations by kind
//! - `aws_controller_reconciliation_errors_total` - Failed reconciliations by kind and reason
//! - `aws_controller_reconciliation_duration_seconds` - Reconciliation duration by kind
//! - `aws_controller_external_operations_total` - Observe/create/update/delete calls by kind
//! - `aws_controller_external_operation_errors_total` - Failed external operations by kind
//! - `aws_controller_aws_api_calls_total` - AWS API calls by service and operation
//! - `aws_controller_aws_api_call_duration_seconds` - AWS API call duration by service
//! - `aws_controller_aws_api_errors_total` - AWS API errors by service and error category

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "aws_controller_reconciliations_total",
            "Total number of reconciliations by kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "aws_controller_reconciliation_errors_total",
            "Total number of reconciliation errors by kind and reason",
        ),
        &["kind", "reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "aws_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds by kind",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static EXTERNAL_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "aws_controller_external_operations_total",
            "Total number of external resource operations by kind and operation",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create EXTERNAL_OPERATIONS_TOTAL metric - this should never happen")
});

static EXTERNAL_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "aws_controller_external_operation_errors_total",
            "Total number of failed external resource operations by kind and operation",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create EXTERNAL_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static AWS_API_CALLS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "aws_controller_aws_api_calls_total",
            "Total number of AWS API calls by service and operation",
        ),
        &["service", "operation"],
    )
    .expect("Failed to create AWS_API_CALLS_TOTAL metric - this should never happen")
});

static AWS_API_CALL_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "aws_controller_aws_api_call_duration_seconds",
            "Duration of AWS API calls in seconds by service",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["service"],
    )
    .expect("Failed to create AWS_API_CALL_DURATION metric - this should never happen")
});

static AWS_API_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "aws_controller_aws_api_errors_total",
            "Total number of AWS API errors by service and error category",
        ),
        &["service", "category"],
    )
    .expect("Failed to create AWS_API_ERRORS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(EXTERNAL_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(EXTERNAL_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AWS_API_CALLS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AWS_API_CALL_DURATION.clone()))?;
    REGISTRY.register(Box::new(AWS_API_ERRORS_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str, reason: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[kind, reason])
        .inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn record_external_operation(kind: &str, operation: &str, success: bool) {
    EXTERNAL_OPERATIONS_TOTAL
        .with_label_values(&[kind, operation])
        .inc();
    if !success {
        EXTERNAL_OPERATION_ERRORS_TOTAL
            .with_label_values(&[kind, operation])
            .inc();
    }
}

pub fn record_aws_call(service: &str, operation: &str, duration: f64) {
    AWS_API_CALLS_TOTAL
        .with_label_values(&[service, operation])
        .inc();
    AWS_API_CALL_DURATION
        .with_label_values(&[service])
        .observe(duration);
}

pub fn increment_aws_errors(service: &str, category: &str) {
    AWS_API_ERRORS_TOTAL
        .with_label_values(&[service, category])
        .inc();
}

/// Encode the registry in the Prometheus text format
pub fn gather_text() -> Result<String> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
