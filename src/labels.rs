// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label, annotation, and finalizer constants used across the operator.
//!
//! This module defines standard Kubernetes labels and fleetdns-specific
//! labels/annotations to ensure consistency across all resources touched by
//! the controller.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the component name within the architecture
pub const K8S_COMPONENT: &str = "app.kubernetes.io/component";

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the application
pub const K8S_NAME: &str = "app.kubernetes.io/name";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

// ============================================================================
// Kubernetes Standard Label Values
// ============================================================================

/// Value for `app.kubernetes.io/part-of` indicating this resource is part of fleetdns
pub const PART_OF_FLEETDNS: &str = "fleetdns";

/// Component value for the traffic routing layer
pub const COMPONENT_TRAFFIC_ROUTING: &str = "traffic-routing";

/// Value for `app.kubernetes.io/managed-by` when a resource is managed by the
/// `TrafficManagerBackend` controller
pub const MANAGED_BY_TRAFFIC_MANAGER_BACKEND: &str = "TrafficManagerBackend";

// ============================================================================
// fleetdns-Specific Annotations
// ============================================================================

/// Annotation indicating which `TrafficManagerProfile` a backend is attached to
pub const FLEETDNS_PROFILE_ANNOTATION: &str = "fleetdns.firestoned.io/profile";

/// Annotation used to trigger reconciliation (value is timestamp)
pub const FLEETDNS_RECONCILE_TRIGGER_ANNOTATION: &str = "fleetdns.firestoned.io/reconcile-trigger";

// ============================================================================
// Finalizers
// ============================================================================

/// Finalizer for `TrafficManagerBackend` resources.
///
/// Blocks deletion until every Azure Traffic Manager endpoint owned by the
/// backend has been removed from the parent profile.
pub const FINALIZER_TRAFFIC_MANAGER_BACKEND: &str =
    "fleetdns.firestoned.io/trafficmanagerbackend-cleanup";
