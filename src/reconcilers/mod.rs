// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Kubernetes reconciliation controllers for fleet traffic management.
//!
//! This module contains the reconciliation logic for the
//! `TrafficManagerBackend` resource. The controller watches the backend and
//! its upstream dependencies and keeps Azure Traffic Manager endpoints in
//! sync with the desired state.
//!
//! # Reconciliation Architecture
//!
//! fleetdns follows the standard Kubernetes controller pattern:
//!
//! 1. **Watch** - Monitor the backend plus its referenced profile, service
//!    import, and the per-cluster export records backing the import
//! 2. **Validate** - Check every cross-resource precondition, reporting
//!    failures through the `Accepted` condition
//! 3. **Reconcile** - Diff desired endpoints against the external profile
//!    and converge with deletes-before-writes ordering
//! 4. **Status** - Report the outcome back exactly once per reconcile
//!
//! # Available Reconcilers
//!
//! - [`reconcile_trafficmanagerbackend`] - Converges the backend's endpoints
//! - [`cleanup_trafficmanagerbackend`] - Deletes owned endpoints before the
//!   finalizer is released

pub mod finalizers;
pub mod retry;
pub mod status;
pub mod trafficmanagerbackend;

pub use trafficmanagerbackend::{cleanup_trafficmanagerbackend, reconcile_trafficmanagerbackend};

/// Check if a resource's spec has changed by comparing generation with
/// `observed_generation`.
///
/// The `metadata.generation` field is incremented by Kubernetes only when the
/// spec changes, while `status.observed_generation` is set by the controller
/// after processing a spec.
///
/// # Returns
///
/// * `true` - Reconciliation is needed (spec changed or first reconciliation)
/// * `false` - No reconciliation needed (spec unchanged, status-only update)
#[must_use]
pub fn should_reconcile(current_generation: Option<i64>, observed_generation: Option<i64>) -> bool {
    match (current_generation, observed_generation) {
        (Some(current), Some(observed)) => current != observed,
        (Some(_), None) => true, // First reconciliation
        _ => false,              // No generation tracking available
    }
}

/// True when a Kubernetes API error is a 404 for the requested object.
#[must_use]
pub fn is_kube_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(api_err) if api_err.code == 404)
}
