// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the controllers with reflector stores.
//!
//! This module provides the core infrastructure for the shared reflector
//! store pattern. The controller receives an `Arc<Context>` that contains:
//! - Kubernetes client
//! - Reflector stores for all CRD types
//! - The Azure Traffic Manager client handle
//! - Metrics registry
//!
//! The stores stand in for controller-runtime style field indexers: watch
//! mappers and the reconciler resolve cross-resource name references with
//! O(n) in-memory scans instead of API queries.

use kube::runtime::reflector::Store;
use kube::{Client, ResourceExt};
use std::sync::Arc;

use crate::azure::TrafficManager;
use crate::crd::{InternalServiceExport, ServiceImport, TrafficManagerBackend, TrafficManagerProfile};

/// Shared context passed to the controllers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for API operations
    pub client: Client,

    /// Reflector stores for all CRD types
    pub stores: Stores,

    /// Azure Traffic Manager client; the only handle to the external provider
    pub traffic_manager: Arc<dyn TrafficManager>,

    /// Metrics registry for observability
    pub metrics: Metrics,
}

/// Collection of all reflector stores for cross-controller queries.
///
/// Each store is populated by a dedicated reflector task and provides
/// in-memory access to resources without API calls.
#[derive(Clone)]
pub struct Stores {
    pub profiles: Store<TrafficManagerProfile>,
    pub backends: Store<TrafficManagerBackend>,
    pub service_imports: Store<ServiceImport>,
    pub internal_service_exports: Store<InternalServiceExport>,
}

impl Stores {
    /// Find all backends in a namespace referencing the given profile.
    ///
    /// This is the reverse lookup behind the profile watch: when a
    /// `TrafficManagerProfile` changes, every backend whose
    /// `spec.profile.name` matches must reconcile.
    ///
    /// # Returns
    /// A vector of (name, namespace) tuples for matching backends
    #[must_use]
    pub fn backends_referencing_profile(
        &self,
        namespace: &str,
        profile_name: &str,
    ) -> Vec<(String, String)> {
        self.backends
            .state()
            .iter()
            .filter(|backend| {
                backend.namespace().as_deref() == Some(namespace)
                    && backend.spec.profile.name == profile_name
            })
            .map(|backend| (backend.name_any(), backend.namespace().unwrap_or_default()))
            .collect()
    }

    /// Find all backends in a namespace referencing the given service import.
    ///
    /// # Returns
    /// A vector of (name, namespace) tuples for matching backends
    #[must_use]
    pub fn backends_referencing_import(
        &self,
        namespace: &str,
        import_name: &str,
    ) -> Vec<(String, String)> {
        self.backends
            .state()
            .iter()
            .filter(|backend| {
                backend.namespace().as_deref() == Some(namespace)
                    && backend.spec.backend.name == import_name
            })
            .map(|backend| (backend.name_any(), backend.namespace().unwrap_or_default()))
            .collect()
    }

    /// Get a specific `ServiceImport` by name and namespace from the store.
    #[must_use]
    pub fn get_service_import(&self, name: &str, namespace: &str) -> Option<Arc<ServiceImport>> {
        self.service_imports
            .state()
            .iter()
            .find(|import| {
                import.name_any() == name && import.namespace().as_deref() == Some(namespace)
            })
            .cloned()
    }

    /// Find every export record describing the given service, across all
    /// member namespaces in the hub.
    ///
    /// The `namespaced_name` key is the `<namespace>/<name>` of the exported
    /// service, which equals the namespace and name of its `ServiceImport`.
    #[must_use]
    pub fn exports_for_service(&self, namespaced_name: &str) -> Vec<Arc<InternalServiceExport>> {
        self.internal_service_exports
            .state()
            .iter()
            .filter(|export| export.spec.service_reference.namespaced_name == namespaced_name)
            .cloned()
            .collect()
    }

    /// Look up the export record for one specific member cluster.
    #[must_use]
    pub fn export_for_cluster(
        &self,
        namespaced_name: &str,
        cluster_id: &str,
    ) -> Option<Arc<InternalServiceExport>> {
        self.internal_service_exports
            .state()
            .iter()
            .find(|export| {
                export.spec.service_reference.namespaced_name == namespaced_name
                    && export.spec.service_reference.cluster_id == cluster_id
            })
            .cloned()
    }
}

/// Metrics handle carried in the context.
///
/// The actual counters live in the global registry (see [`crate::metrics`]);
/// this struct exists so per-context metric state can be added without
/// re-plumbing the reconcilers.
#[derive(Clone, Default)]
pub struct Metrics {}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
