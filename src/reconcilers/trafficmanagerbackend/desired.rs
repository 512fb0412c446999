// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Desired-endpoint construction: naming, ownership, and weight apportionment.
//!
//! Endpoint names are deterministic and double as the ownership record:
//! `fleet-<backendUID>#<serviceImport>#<cluster>`. The provider compares
//! names case-insensitively, so every ownership test lowercases first.
//!
//! Weights follow the proportional rule: with total weight `W` and export
//! weights `w_c`, each eligible cluster receives `ceil(w_c * W / sum(w_c))`.
//! An export with weight 0 receives no endpoint.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::azure::{AtmEndpoint, AtmEndpointProperties};
use crate::constants::{
    ATM_ENDPOINT_NAME_SEPARATOR, ATM_ENDPOINT_STATUS_ENABLED, ATM_ENDPOINT_TYPE,
    ATM_RESOURCE_PREFIX,
};
use crate::crd::{EndpointSource, InternalServiceExport, TrafficManagerEndpointStatus};

/// One endpoint the provider should materialize.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DesiredEndpoint {
    /// Full endpoint name beneath the external profile.
    pub name: String,
    /// Azure resource ID of the exported public IP.
    pub target_resource_id: String,
    /// Apportioned routing weight.
    pub weight: i64,
    /// Source member cluster.
    pub from_cluster: String,
    /// The export's weight before apportionment.
    pub from_weight: i64,
}

/// Ownership prefix for every endpoint of a backend: `fleet-<backendUID>#`.
#[must_use]
pub fn endpoint_prefix(backend_uid: &str) -> String {
    format!("{ATM_RESOURCE_PREFIX}{backend_uid}{ATM_ENDPOINT_NAME_SEPARATOR}")
}

/// Deterministic endpoint name: `fleet-<backendUID>#<serviceImport>#<cluster>`.
#[must_use]
pub fn endpoint_name(backend_uid: &str, import_name: &str, cluster_id: &str) -> String {
    format!(
        "{}{import_name}{ATM_ENDPOINT_NAME_SEPARATOR}{cluster_id}",
        endpoint_prefix(backend_uid)
    )
}

/// Ownership test: does this provider endpoint belong to the backend with
/// the given prefix? Case-insensitive, since the provider is.
#[must_use]
pub fn is_owned_endpoint(name: &str, prefix: &str) -> bool {
    name.to_lowercase().starts_with(&prefix.to_lowercase())
}

/// Normalize an Azure endpoint type for comparison.
///
/// Azure returns either the short form (`AzureEndpoints`) or the fully
/// qualified form (`Microsoft.Network/trafficManagerProfiles/azureEndpoints`)
/// depending on the API path; the last path segment, lowercased, is the
/// comparable identity.
#[must_use]
pub fn normalize_endpoint_type(endpoint_type: &str) -> String {
    endpoint_type
        .rsplit('/')
        .next()
        .unwrap_or(endpoint_type)
        .to_lowercase()
}

/// Proportional ceiling apportionment.
///
/// Returns `ceil(weight * total / sum)`; callers guarantee `sum > 0`.
fn apportion(weight: i64, total: i64, sum: i64) -> i64 {
    (weight * total + sum - 1) / sum
}

/// Build the desired endpoint map for a backend.
///
/// One entry per eligible export with a positive weight, keyed by the
/// lowercased endpoint name so the provider walk can match case-insensitively.
///
/// # Arguments
///
/// * `backend_uid` - UID of the owning `TrafficManagerBackend`
/// * `import_name` - Name of the referenced `ServiceImport`
/// * `total_weight` - The backend's total weight to distribute (> 0)
/// * `eligible` - Export records that passed the eligibility checks
#[must_use]
pub fn build_desired_endpoints(
    backend_uid: &str,
    import_name: &str,
    total_weight: i64,
    eligible: &[Arc<InternalServiceExport>],
) -> BTreeMap<String, DesiredEndpoint> {
    let weight_sum: i64 = eligible.iter().map(|e| e.effective_weight().max(0)).sum();
    if weight_sum == 0 {
        return BTreeMap::new();
    }

    let mut desired = BTreeMap::new();
    for export in eligible {
        let from_weight = export.effective_weight().max(0);
        if from_weight == 0 {
            // Weight 0 means "do not route to this cluster"
            continue;
        }

        // The validators guarantee the public IP resource ID is present on
        // eligible exports
        let Some(target_resource_id) = export.spec.public_ip_resource_id.clone() else {
            continue;
        };

        let cluster_id = export.spec.service_reference.cluster_id.clone();
        let name = endpoint_name(backend_uid, import_name, &cluster_id);
        desired.insert(
            name.to_lowercase(),
            DesiredEndpoint {
                name,
                target_resource_id,
                weight: apportion(from_weight, total_weight, weight_sum),
                from_cluster: cluster_id,
                from_weight,
            },
        );
    }

    desired
}

impl DesiredEndpoint {
    /// The wire representation sent to the provider.
    #[must_use]
    pub fn to_atm_endpoint(&self) -> AtmEndpoint {
        AtmEndpoint {
            id: None,
            name: Some(self.name.clone()),
            endpoint_type: Some(ATM_ENDPOINT_TYPE.to_string()),
            properties: Some(AtmEndpointProperties {
                target_resource_id: Some(self.target_resource_id.clone()),
                target: None,
                endpoint_status: Some(ATM_ENDPOINT_STATUS_ENABLED.to_string()),
                weight: Some(self.weight),
            }),
        }
    }

    /// Semantic equality against a provider endpoint.
    ///
    /// Equal means: type, target resource ID, and endpoint status match
    /// case-insensitively, the weight matches exactly, and none of those
    /// fields is absent. An equal endpoint needs no write.
    #[must_use]
    pub fn matches(&self, existing: &AtmEndpoint) -> bool {
        let Some(properties) = &existing.properties else {
            return false;
        };
        let (Some(endpoint_type), Some(target), Some(status), Some(weight)) = (
            existing.endpoint_type.as_deref(),
            properties.target_resource_id.as_deref(),
            properties.endpoint_status.as_deref(),
            properties.weight,
        ) else {
            return false;
        };

        normalize_endpoint_type(endpoint_type) == normalize_endpoint_type(ATM_ENDPOINT_TYPE)
            && target.eq_ignore_ascii_case(&self.target_resource_id)
            && status.eq_ignore_ascii_case(ATM_ENDPOINT_STATUS_ENABLED)
            && weight == self.weight
    }

    /// The status entry reported back on the backend.
    #[must_use]
    pub fn to_status(&self) -> TrafficManagerEndpointStatus {
        TrafficManagerEndpointStatus {
            name: self.name.clone(),
            target: Some(self.target_resource_id.clone()),
            weight: Some(self.weight),
            from: Some(EndpointSource {
                cluster: self.from_cluster.clone(),
                weight: Some(self.from_weight),
            }),
        }
    }
}
