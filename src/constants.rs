// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the fleetdns operator.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group for all fleetdns CRDs
pub const API_GROUP: &str = "fleetdns.firestoned.io";

/// API version for all fleetdns CRDs
pub const API_VERSION: &str = "v1alpha1";

/// Fully qualified API version (group/version)
pub const API_GROUP_VERSION: &str = "fleetdns.firestoned.io/v1alpha1";

/// Kind name for `TrafficManagerProfile` resource
pub const KIND_TRAFFIC_MANAGER_PROFILE: &str = "TrafficManagerProfile";

/// Kind name for `TrafficManagerBackend` resource
pub const KIND_TRAFFIC_MANAGER_BACKEND: &str = "TrafficManagerBackend";

/// Kind name for `ServiceImport` resource
pub const KIND_SERVICE_IMPORT: &str = "ServiceImport";

/// Kind name for `InternalServiceExport` resource
pub const KIND_INTERNAL_SERVICE_EXPORT: &str = "InternalServiceExport";

// ============================================================================
// Traffic Manager Constants
// ============================================================================

/// Prefix for all Azure Traffic Manager resources owned by the fleet.
///
/// Both the external profile name (`fleet-<profileUID>`) and every endpoint
/// name (`fleet-<backendUID>#...`) start with this prefix.
pub const ATM_RESOURCE_PREFIX: &str = "fleet-";

/// Separator between the segments of an endpoint name
/// (`fleet-<backendUID>#<serviceImport>#<cluster>`)
pub const ATM_ENDPOINT_NAME_SEPARATOR: char = '#';

/// Short-form Azure endpoint type used on every write
pub const ATM_ENDPOINT_TYPE: &str = "AzureEndpoints";

/// Fully qualified Azure endpoint type as returned by some API reads
pub const ATM_ENDPOINT_TYPE_LONG: &str = "Microsoft.Network/trafficManagerProfiles/azureEndpoints";

/// Endpoint status written for every managed endpoint
pub const ATM_ENDPOINT_STATUS_ENABLED: &str = "Enabled";

/// ARM API version for Traffic Manager requests
pub const ATM_API_VERSION: &str = "2022-04-01";

/// Default ARM management endpoint
pub const ATM_DEFAULT_BASE_URL: &str = "https://management.azure.com";

/// Default weight for a `TrafficManagerBackend` when `spec.weight` is unset
pub const DEFAULT_BACKEND_WEIGHT: i64 = 1;

/// Default weight for an `InternalServiceExport` when `spec.weight` is unset
pub const DEFAULT_EXPORT_WEIGHT: i64 = 1;

/// Minimum allowed `TrafficManagerBackend` weight
pub const MIN_BACKEND_WEIGHT: i64 = 0;

/// Maximum allowed `TrafficManagerBackend` weight
pub const MAX_BACKEND_WEIGHT: i64 = 1000;

/// Maximum number of concurrent endpoint deletions during cleanup
pub const ENDPOINT_CLEANUP_CONCURRENCY: usize = 4;

// ============================================================================
// Controller Error Handling Constants
// ============================================================================

/// Requeue duration for controller errors (30 seconds)
pub const ERROR_REQUEUE_DURATION_SECS: u64 = 30;

/// Requeue interval once a backend reached steady state (5 minutes)
pub const REQUEUE_WHEN_ACCEPTED_SECS: u64 = 300;

/// Requeue interval while a backend is pending or invalid (30 seconds)
pub const REQUEUE_WHEN_NOT_ACCEPTED_SECS: u64 = 30;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default leader election lease duration (15 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election renew deadline (10 seconds)
pub const DEFAULT_LEASE_RENEW_DEADLINE_SECS: u64 = 10;

/// Default leader election retry period (2 seconds)
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 2;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
