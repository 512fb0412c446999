// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for fleet traffic management.
//!
//! This module defines all Kubernetes Custom Resource Definitions used by
//! fleetdns to expose multi-cluster services through Azure Traffic Manager.
//!
//! # Resource Types
//!
//! ## Traffic routing
//!
//! - [`TrafficManagerProfile`] - A managed Azure Traffic Manager profile (the
//!   DNS-level parent; materialized by its own reconciler)
//! - [`TrafficManagerBackend`] - Attaches the per-cluster endpoints of a
//!   [`ServiceImport`] to a profile with a total weight
//!
//! ## Multi-cluster service aggregation
//!
//! - [`ServiceImport`] - The aggregated, hub-side view of a service exported
//!   from one or more member clusters
//! - [`InternalServiceExport`] - One member cluster's record of its local
//!   service and the Azure public IP backing it
//!
//! # Example: Exposing a ServiceImport
//!
//! ```yaml
//! apiVersion: fleetdns.firestoned.io/v1alpha1
//! kind: TrafficManagerBackend
//! metadata:
//!   name: team-a-store
//!   namespace: team-a
//! spec:
//!   profile:
//!     name: team-a-profile
//!   backend:
//!     name: store
//!   weight: 100
//! ```
//!
//! The controller splits `weight` proportionally across the member clusters
//! listed in the ServiceImport's status and registers one Azure endpoint per
//! eligible cluster beneath the profile.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::{ATM_RESOURCE_PREFIX, DEFAULT_BACKEND_WEIGHT, DEFAULT_EXPORT_WEIGHT};

/// Condition represents an observation of a resource's current state.
///
/// Conditions are used in status subresources to communicate the state of
/// a resource to users and controllers.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition. fleetdns uses `Accepted` on backends and
    /// `Programmed` on profiles.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,

    /// The `metadata.generation` the condition was computed against.
    ///
    /// Clients compare this with the current generation to detect staleness.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

// ============================================================================
// TrafficManagerProfile
// ============================================================================

/// `TrafficManagerProfile` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficManagerProfileStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `TrafficManagerProfile` requests a DNS-based traffic routing profile in
/// Azure Traffic Manager.
///
/// The profile reconciler (a separate controller) materializes the external
/// Azure resource and reports readiness through the `Programmed` condition.
/// `TrafficManagerBackend` resources in the same namespace reference the
/// profile by name and register endpoints beneath it; this controller only
/// reads profiles.
///
/// # Example
///
/// ```yaml
/// apiVersion: fleetdns.firestoned.io/v1alpha1
/// kind: TrafficManagerProfile
/// metadata:
///   name: team-a-profile
///   namespace: team-a
/// spec:
///   resourceGroup: fleet-rg
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleetdns.firestoned.io",
    version = "v1alpha1",
    kind = "TrafficManagerProfile",
    namespaced,
    shortname = "tmprofile",
    doc = "TrafficManagerProfile requests an Azure Traffic Manager profile for a fleet namespace. The external profile name is derived from the profile UID; backends attach endpoints beneath it.",
    printcolumn = r#"{"name":"ResourceGroup","type":"string","jsonPath":".spec.resourceGroup"}"#,
    printcolumn = r#"{"name":"Programmed","type":"string","jsonPath":".status.conditions[?(@.type=='Programmed')].status"}"#
)]
#[kube(status = "TrafficManagerProfileStatus")]
#[serde(rename_all = "camelCase")]
pub struct TrafficManagerProfileSpec {
    /// Azure resource group hosting the Traffic Manager profile.
    ///
    /// Immutable after creation; changing it would orphan the external
    /// resource. Mutating updates must be rejected by admission.
    #[schemars(length(min = 1, max = 90))]
    pub resource_group: String,
}

impl TrafficManagerProfile {
    /// Deterministic name of the external Azure Traffic Manager profile.
    ///
    /// Derived from the profile UID so that recreating a profile object with
    /// the same name never collides with a half-deleted predecessor.
    #[must_use]
    pub fn atm_profile_name(&self) -> Option<String> {
        self.metadata
            .uid
            .as_ref()
            .map(|uid| format!("{ATM_RESOURCE_PREFIX}{uid}"))
    }

    /// Find the `Programmed` condition, if the profile reconciler wrote one.
    #[must_use]
    pub fn programmed_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.r#type == crate::status_reasons::CONDITION_PROGRAMMED)
    }
}

// ============================================================================
// TrafficManagerBackend
// ============================================================================

/// Reference to a `TrafficManagerProfile` in the same namespace.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileReference {
    /// Name of the profile.
    pub name: String,
}

/// Reference to a `ServiceImport` in the same namespace.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BackendReference {
    /// Name of the service import.
    pub name: String,
}

/// The member cluster a status endpoint was derived from.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSource {
    /// Member cluster identifier.
    pub cluster: String,

    /// The export's own weight before apportionment, for reporting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
}

/// One Azure Traffic Manager endpoint accepted on behalf of this backend.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TrafficManagerEndpointStatus {
    /// Endpoint name beneath the external profile
    /// (`fleet-<backendUID>#<serviceImport>#<cluster>`).
    pub name: String,

    /// Resource the endpoint routes to (the exported public IP resource ID).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// Weight assigned to the endpoint after apportionment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,

    /// Which member cluster, and at which source weight, this endpoint
    /// originates from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<EndpointSource>,
}

/// `TrafficManagerBackend` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrafficManagerBackendStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Endpoints the controller believes are present at the provider.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub endpoints: Vec<TrafficManagerEndpointStatus>,
}

/// `TrafficManagerBackend` attaches the per-cluster endpoints of a
/// `ServiceImport` to a `TrafficManagerProfile`.
///
/// For every eligible member cluster exporting the service, the controller
/// registers one weighted Azure endpoint beneath the profile. `spec.weight`
/// is the total to distribute; each endpoint receives
/// `ceil(exportWeight * weight / sumOfExportWeights)`.
///
/// Both references are same-namespace and immutable after creation.
///
/// # Example
///
/// ```yaml
/// apiVersion: fleetdns.firestoned.io/v1alpha1
/// kind: TrafficManagerBackend
/// metadata:
///   name: team-a-store
///   namespace: team-a
/// spec:
///   profile:
///     name: team-a-profile
///   backend:
///     name: store
///   weight: 100
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleetdns.firestoned.io",
    version = "v1alpha1",
    kind = "TrafficManagerBackend",
    namespaced,
    shortname = "tmbackend",
    doc = "TrafficManagerBackend registers the per-cluster endpoints of a ServiceImport beneath an Azure Traffic Manager profile, splitting a total weight proportionally across the exporting member clusters.",
    printcolumn = r#"{"name":"Profile","type":"string","jsonPath":".spec.profile.name"}"#,
    printcolumn = r#"{"name":"Backend","type":"string","jsonPath":".spec.backend.name"}"#,
    printcolumn = r#"{"name":"Weight","type":"integer","jsonPath":".spec.weight"}"#,
    printcolumn = r#"{"name":"Accepted","type":"string","jsonPath":".status.conditions[?(@.type=='Accepted')].status"}"#
)]
#[kube(status = "TrafficManagerBackendStatus")]
#[serde(rename_all = "camelCase")]
pub struct TrafficManagerBackendSpec {
    /// The `TrafficManagerProfile` to attach endpoints to.
    ///
    /// Must name a profile in the same namespace. Immutable after creation.
    pub profile: ProfileReference,

    /// The `ServiceImport` whose exporting clusters become endpoints.
    ///
    /// Must name a service import in the same namespace. Immutable after
    /// creation.
    pub backend: BackendReference,

    /// Total weight to distribute across the per-cluster endpoints.
    ///
    /// Defaults to 1. A weight of 0 removes every endpoint owned by this
    /// backend while keeping the backend itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0, max = 1000))]
    pub weight: Option<i64>,
}

impl TrafficManagerBackend {
    /// The total weight to distribute, with the API default applied.
    #[must_use]
    pub fn effective_weight(&self) -> i64 {
        self.spec.weight.unwrap_or(DEFAULT_BACKEND_WEIGHT)
    }

    /// Find the `Accepted` condition, if a reconcile has completed before.
    #[must_use]
    pub fn accepted_condition(&self) -> Option<&Condition> {
        self.status
            .as_ref()?
            .conditions
            .iter()
            .find(|c| c.r#type == crate::status_reasons::CONDITION_ACCEPTED)
    }
}

// ============================================================================
// ServiceImport
// ============================================================================

/// A port exposed by an aggregated multi-cluster service.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceImportPort {
    /// Port name, matching the exported service's port name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Protocol (TCP or UDP).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// Port number.
    pub port: i32,
}

/// A member cluster currently exporting the service.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Member cluster identifier.
    pub cluster: String,
}

/// `ServiceImport` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceImportStatus {
    /// Member clusters whose export of this service has been accepted,
    /// in registration order.
    #[serde(default)]
    pub clusters: Vec<ClusterStatus>,
}

/// `ServiceImport` is the hub-side aggregated view of a service exported from
/// member clusters.
///
/// The export pipeline (a separate set of controllers) populates
/// `status.clusters` as member exports are accepted. This controller treats
/// the import as read-only input: the cluster list is the authoritative set
/// of candidate endpoints for any backend referencing the import.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleetdns.firestoned.io",
    version = "v1alpha1",
    kind = "ServiceImport",
    namespaced,
    shortname = "simport",
    doc = "ServiceImport is the aggregated view of a service exported from multiple member clusters of the fleet.",
    printcolumn = r#"{"name":"Clusters","type":"string","jsonPath":".status.clusters[*].cluster"}"#
)]
#[kube(status = "ServiceImportStatus")]
#[serde(rename_all = "camelCase")]
pub struct ServiceImportSpec {
    /// Ports exposed by the aggregated service, carried from member exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<ServiceImportPort>>,
}

// ============================================================================
// InternalServiceExport
// ============================================================================

/// Identifies the member-cluster service an export record describes.
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceReference {
    /// Namespace of the service in the member cluster (and of the matching
    /// `ServiceImport` in the hub).
    pub namespace: String,

    /// Name of the service.
    pub name: String,

    /// Identifier of the member cluster the service lives in.
    #[serde(rename = "clusterID")]
    pub cluster_id: String,

    /// Convenience `<namespace>/<name>` key used for indexed lookups.
    pub namespaced_name: String,
}

/// `InternalServiceExport` status
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InternalServiceExportStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// `InternalServiceExport` is one member cluster's record of a service it
/// exports, stored in the hub by the export pipeline.
///
/// Only exports of public, DNS-labeled LoadBalancer services are eligible to
/// become Traffic Manager endpoints; the remaining fields exist so the
/// backend reconciler can explain ineligibility in its status.
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fleetdns.firestoned.io",
    version = "v1alpha1",
    kind = "InternalServiceExport",
    namespaced,
    shortname = "isexport",
    doc = "InternalServiceExport records one member cluster's exported service and the Azure public IP backing it.",
    printcolumn = r#"{"name":"Cluster","type":"string","jsonPath":".spec.serviceReference.clusterID"}"#,
    printcolumn = r#"{"name":"Type","type":"string","jsonPath":".spec.type"}"#,
    printcolumn = r#"{"name":"Weight","type":"integer","jsonPath":".spec.weight"}"#
)]
#[kube(status = "InternalServiceExportStatus")]
#[serde(rename_all = "camelCase")]
pub struct InternalServiceExportSpec {
    /// Service type in the member cluster. Only `LoadBalancer` services can
    /// be exposed through Traffic Manager.
    pub r#type: String,

    /// Whether the load balancer is internal. Internal load balancers have
    /// no public IP and cannot be exposed.
    #[serde(default)]
    pub is_internal_load_balancer: bool,

    /// Whether a DNS label is configured on the service's public IP. Azure
    /// endpoints require the IP to resolve to a DNS name.
    #[serde(default, rename = "isDNSLabelConfigured")]
    pub is_dns_label_configured: bool,

    /// Azure resource ID of the public IP fronting the service.
    #[serde(default, rename = "publicIPResourceID", skip_serializing_if = "Option::is_none")]
    pub public_ip_resource_id: Option<String>,

    /// Relative routing weight of this cluster's endpoint. Defaults to 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 0))]
    pub weight: Option<i64>,

    /// The member-cluster service this export describes.
    pub service_reference: ServiceReference,
}

impl InternalServiceExport {
    /// The export's routing weight, with the API default applied.
    #[must_use]
    pub fn effective_weight(&self) -> i64 {
        self.spec.weight.unwrap_or(DEFAULT_EXPORT_WEIGHT)
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
