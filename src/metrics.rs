// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the fleetdns operator.
//!
//! This module provides metrics collection with the namespace prefix
//! `fleetdns_firestoned_io_` (prometheus-safe version of
//! "fleetdns.firestoned.io").
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Track reconciliation operations and their outcomes
//! - **Provider Metrics** - Track Azure Traffic Manager writes
//! - **Error Metrics** - Track error conditions and types
//! - **Leader Election Metrics** - Track leadership state changes
//!
//! # Example
//!
//! ```rust,no_run
//! use fleetdns::metrics::record_reconciliation_success;
//!
//! // Record a successful reconciliation
//! record_reconciliation_success("TrafficManagerBackend", std::time::Duration::from_secs(1));
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

/// Namespace prefix for all fleetdns metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "fleetdns_firestoned_io";

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via the `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by resource type and status
///
/// Labels:
/// - `resource_type`: Kind of resource (e.g., `TrafficManagerBackend`)
/// - `status`: Outcome (`success`, `error`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by resource type and status",
    );
    let counter = CounterVec::new(opts, &["resource_type", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of reconciliations in seconds
///
/// Labels:
/// - `resource_type`: Kind of resource
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by resource type",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["resource_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

// ============================================================================
// Provider Metrics
// ============================================================================

/// Total number of Azure Traffic Manager endpoint writes
///
/// Labels:
/// - `operation`: `create_or_update` or `delete`
/// - `status`: Outcome (`success`, `error`)
pub static PROVIDER_ENDPOINT_WRITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_provider_endpoint_writes_total"),
        "Total number of Azure Traffic Manager endpoint writes by operation and status",
    );
    let counter = CounterVec::new(opts, &["operation", "status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by resource type and error category
///
/// Labels:
/// - `resource_type`: Kind of resource
/// - `error_type`: Category of error (`api_error`, `provider_error`, `reconcile_error`)
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by resource type and error category",
    );
    let counter = CounterVec::new(opts, &["resource_type", "error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Leader Election Metrics
// ============================================================================

/// Total number of leader election events
///
/// Labels:
/// - `status`: Event type (`acquired`, `lost`)
pub static LEADER_ELECTIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_elections_total"),
        "Total number of leader election events by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Current leader election status
///
/// Labels:
/// - `pod_name`: Name of the pod
///
/// Value: 1 if leader, 0 if follower
pub static LEADER_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_status"),
        "Current leader election status (1 = leader, 0 = follower)",
    );
    let gauge = GaugeVec::new(opts, &["pod_name"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `duration` - Duration of the reconciliation
pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed reconciliation
///
/// # Arguments
/// * `resource_type` - The kind of resource reconciled
/// * `duration` - Duration of the reconciliation before failure
pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record an Azure Traffic Manager endpoint write
///
/// # Arguments
/// * `operation` - `create_or_update` or `delete`
/// * `success` - Whether the write succeeded
pub fn record_provider_endpoint_write(operation: &str, success: bool) {
    let status = if success { "success" } else { "error" };
    PROVIDER_ENDPOINT_WRITES_TOTAL
        .with_label_values(&[operation, status])
        .inc();
}

/// Record an error
///
/// # Arguments
/// * `resource_type` - The kind of resource where the error occurred
/// * `error_type` - Category of error (e.g., `api_error`, `provider_error`)
pub fn record_error(resource_type: &str, error_type: &str) {
    ERRORS_TOTAL
        .with_label_values(&[resource_type, error_type])
        .inc();
}

/// Record leader election acquired
///
/// # Arguments
/// * `pod_name` - Name of the pod that acquired leadership
pub fn record_leader_elected(pod_name: &str) {
    LEADER_ELECTIONS_TOTAL
        .with_label_values(&["acquired"])
        .inc();
    LEADER_STATUS.with_label_values(&[pod_name]).set(1.0);
}

/// Record leader election lost
///
/// # Arguments
/// * `pod_name` - Name of the pod that lost leadership
pub fn record_leader_lost(pod_name: &str) {
    LEADER_ELECTIONS_TOTAL.with_label_values(&["lost"]).inc();
    LEADER_STATUS.with_label_values(&[pod_name]).set(0.0);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Returns
/// Prometheus-formatted metrics as a String
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_reconciliation_success() {
        let resource_type = "TestResource";
        let duration = Duration::from_millis(500);

        record_reconciliation_success(resource_type, duration);

        let counter = RECONCILIATION_TOTAL.with_label_values(&[resource_type, "success"]);
        assert!(counter.get() > 0.0);

        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&[resource_type]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_provider_write() {
        record_provider_endpoint_write("delete", true);
        let counter = PROVIDER_ENDPOINT_WRITES_TOTAL.with_label_values(&["delete", "success"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation_success("GatherTest", Duration::from_millis(100));

        let result = gather_metrics();
        assert!(result.is_ok(), "Gathering metrics should succeed");

        let metrics_text = result.unwrap();
        assert!(
            metrics_text.contains("fleetdns_firestoned_io"),
            "Metrics should contain namespace prefix"
        );
        assert!(
            metrics_text.contains("reconciliations_total"),
            "Metrics should contain reconciliation counter"
        );
    }
}
