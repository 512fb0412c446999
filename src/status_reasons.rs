// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Standard Kubernetes status condition types and reasons for fleetdns resources.
//!
//! This module defines constants for condition reasons following Kubernetes
//! conventions. Reasons are programmatic identifiers in CamelCase that explain
//! why a condition has a particular status.
//!
//! # Condition Types
//!
//! A `TrafficManagerBackend` carries a single encompassing `type: Accepted`
//! condition summarizing whether its endpoints are registered with the Azure
//! Traffic Manager profile:
//!
//! | Status  | Reason   | Meaning                                                 |
//! |---------|----------|---------------------------------------------------------|
//! | True    | Accepted | All eligible endpoints registered; counts match         |
//! | False   | Invalid  | User or operator must act (bad reference, bad export)   |
//! | Unknown | Pending  | The controller will self-heal (race or transient error) |
//!
//! A `TrafficManagerProfile` carries a `type: Programmed` condition written by
//! its own reconciler; this controller only reads it.
//!
//! # Example Status
//!
//! ```yaml
//! status:
//!   conditions:
//!     - type: Accepted
//!       status: "True"
//!       reason: Accepted
//!       message: "2 endpoint(s) are accepted in the Azure Traffic Manager profile"
//!       observedGeneration: 3
//! ```

// ============================================================================
// Condition Types
// ============================================================================

/// Condition type summarizing a `TrafficManagerBackend`
pub const CONDITION_ACCEPTED: &str = "Accepted";

/// Condition type written by the `TrafficManagerProfile` reconciler
pub const CONDITION_PROGRAMMED: &str = "Programmed";

// ============================================================================
// Condition Statuses
// ============================================================================

/// Condition status "True"
pub const STATUS_TRUE: &str = "True";

/// Condition status "False"
pub const STATUS_FALSE: &str = "False";

/// Condition status "Unknown"
pub const STATUS_UNKNOWN: &str = "Unknown";

// ============================================================================
// TrafficManagerBackend Reasons
// ============================================================================

/// The backend's endpoints are registered and consistent with the spec.
pub const REASON_ACCEPTED: &str = "Accepted";

/// A referenced resource is missing or unusable; a user or operator must act.
pub const REASON_INVALID: &str = "Invalid";

/// A dependency is not settled yet or a transient error occurred; the
/// controller retries or waits for a watch event.
pub const REASON_PENDING: &str = "Pending";
