//! # Metrics
//!
//! Prometheus metrics for monitoring rotations.
//!
//! ## Metrics Exposed
//!
//! - `credential_rotator_steps_total` - Dispatched steps by step and outcome
//! - `credential_rotator_step_errors_total` - Failed steps by step and error kind
//! - `credential_rotator_step_duration_seconds` - Duration of each step
//! - `credential_rotator_store_operations_total` - Secret store calls by operation
//! - `credential_rotator_store_operation_duration_seconds` - Duration of secret store calls
//! - `credential_rotator_store_operation_errors_total` - Failed secret store calls
//! - `credential_rotator_target_operations_total` - Database calls by operation and result

use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static STEPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_rotator_steps_total",
            "Total number of dispatched rotation steps by step and outcome",
        ),
        &["step", "outcome"],
    )
    .expect("Failed to create STEPS_TOTAL metric - this should never happen")
});

static STEP_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_rotator_step_errors_total",
            "Total number of failed rotation steps by step and error kind",
        ),
        &["step", "kind"],
    )
    .expect("Failed to create STEP_ERRORS_TOTAL metric - this should never happen")
});

static STEP_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "credential_rotator_step_duration_seconds",
            "Duration of rotation steps in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["step"],
    )
    .expect("Failed to create STEP_DURATION metric - this should never happen")
});

static STORE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_rotator_store_operations_total",
            "Total number of secret store operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create STORE_OPERATIONS_TOTAL metric - this should never happen")
});

static STORE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "credential_rotator_store_operation_duration_seconds",
            "Duration of secret store operations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["operation"],
    )
    .expect("Failed to create STORE_OPERATION_DURATION metric - this should never happen")
});

static STORE_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_rotator_store_operation_errors_total",
            "Total number of failed secret store operations by operation",
        ),
        &["operation"],
    )
    .expect("Failed to create STORE_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static TARGET_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "credential_rotator_target_operations_total",
            "Total number of database operations by operation and result",
        ),
        &["operation", "result"],
    )
    .expect("Failed to create TARGET_OPERATIONS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when called twice in one process"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(STEPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STEP_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STEP_DURATION.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(STORE_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TARGET_OPERATIONS_TOTAL.clone()))?;
    Ok(())
}

/// Record a dispatched step and how long it took
pub fn record_step(step: &str, outcome: &str, duration: f64) {
    STEPS_TOTAL.with_label_values(&[step, outcome]).inc();
    STEP_DURATION.with_label_values(&[step]).observe(duration);
}

pub fn record_step_error(step: &str, kind: &str, duration: f64) {
    STEPS_TOTAL.with_label_values(&[step, "failed"]).inc();
    STEP_ERRORS_TOTAL.with_label_values(&[step, kind]).inc();
    STEP_DURATION.with_label_values(&[step]).observe(duration);
}

pub fn record_store_operation(operation: &str, duration: f64) {
    STORE_OPERATIONS_TOTAL.with_label_values(&[operation]).inc();
    STORE_OPERATION_DURATION
        .with_label_values(&[operation])
        .observe(duration);
}

pub fn increment_store_operation_errors(operation: &str) {
    STORE_OPERATION_ERRORS_TOTAL
        .with_label_values(&[operation])
        .inc();
}

pub fn record_target_operation(operation: &str, result: &str) {
    TARGET_OPERATIONS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}
