//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `harbor_operator_reconciliations_total` - Reconciliations by component
//! - `harbor_operator_reconciliation_errors_total` - Failed reconciliations by component and reason
//! - `harbor_operator_reconciliation_duration_seconds` - Duration of reconciliations by component
//! - `harbor_operator_child_writes_total` - Writes to child objects by kind and operation
//! - `harbor_operator_dependent_ready` - Readiness of external dependents (1 ready, 0 not ready)

use anyhow::Result;
use prometheus::{Encoder, HistogramVec, IntCounterVec, IntGaugeVec, Registry, TextEncoder};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "harbor_operator_reconciliations_total",
            "Total number of reconciliations by component",
        ),
        &["component"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "harbor_operator_reconciliation_errors_total",
            "Total number of reconciliation errors by component and reason",
        ),
        &["component", "reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "harbor_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["component"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static CHILD_WRITES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "harbor_operator_child_writes_total",
            "Total number of writes to child objects by kind and operation",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create CHILD_WRITES_TOTAL metric - this should never happen")
});

static DEPENDENT_READY: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new(
            "harbor_operator_dependent_ready",
            "Readiness of external dependents (1 ready, 0 not ready)",
        ),
        &["kind", "namespace", "name"],
    )
    .expect("Failed to create DEPENDENT_READY metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CHILD_WRITES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DEPENDENT_READY.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(component: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[component]).inc();
}

pub fn increment_reconciliation_errors(component: &str, reason: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[component, reason])
        .inc();
}

pub fn observe_reconciliation_duration(component: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[component])
        .observe(duration);
}

pub fn increment_child_writes(kind: &str, operation: &str) {
    CHILD_WRITES_TOTAL.with_label_values(&[kind, operation]).inc();
}

pub fn set_dependent_ready(kind: &str, namespace: &str, name: &str, ready: bool) {
    DEPENDENT_READY
        .with_label_values(&[kind, namespace, name])
        .set(i64::from(ready));
}

/// Render the registry in the Prometheus text format
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn encode_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
