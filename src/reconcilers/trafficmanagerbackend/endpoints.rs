// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Endpoint reconciliation against Azure Traffic Manager.
//!
//! The diff walks the endpoint list embedded in the fetched profile, so a
//! reconcile costs one provider read plus only the writes that are actually
//! needed. Deletions complete before creations and updates, so an endpoint
//! name can never flap within a single pass.
//!
//! Failure handling per write:
//! - 404 on delete is success (the endpoint is already gone);
//! - a non-throttled client error marks that endpoint failed and the batch
//!   continues;
//! - throttling, server errors, and network errors halt the batch and bubble
//!   up so the controller retries with backoff.

use futures::stream::{self, TryStreamExt};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::azure::{TrafficManager, TrafficManagerError};
use crate::azure::traffic_manager::AtmProfile;
use crate::constants::{ATM_ENDPOINT_TYPE, ENDPOINT_CLEANUP_CONCURRENCY};
use crate::crd::TrafficManagerEndpointStatus;
use crate::metrics::record_provider_endpoint_write;

use super::desired::{is_owned_endpoint, DesiredEndpoint};

/// A provider failure that stops the batch: throttling, server errors, or
/// network failures. The reconcile surfaces it as `Accepted=Unknown` and
/// retries with backoff.
#[derive(Debug, Error)]
#[error("endpoint '{endpoint}': {source}")]
pub struct EndpointWriteHalt {
    /// Endpoint the failing write was addressed to
    pub endpoint: String,
    /// The underlying provider error
    #[source]
    pub source: TrafficManagerError,
}

/// Result of one endpoint reconciliation pass.
#[derive(Debug, Default)]
pub struct EndpointReconcileOutcome {
    /// Status entries for endpoints now present at the provider, sorted by
    /// name.
    pub accepted: Vec<TrafficManagerEndpointStatus>,
    /// Human-readable failures for endpoints Azure rejected with a client
    /// error.
    pub failures: Vec<String>,
}

/// Converge the owned endpoints beneath a profile to the desired map.
///
/// Walks the profile's embedded endpoints first: unnamed entries are logged
/// and skipped, foreign entries (prefix mismatch) are left untouched, stale
/// owned entries are deleted, and entries already semantically equal to
/// their desired counterpart are accepted without a write. Whatever remains
/// in the desired map is then created or updated.
///
/// # Errors
///
/// Returns [`EndpointWriteHalt`] on the first throttled/server/network
/// failure; client errors are collected into the outcome instead.
pub async fn reconcile_endpoints(
    traffic_manager: &dyn TrafficManager,
    resource_group: &str,
    profile_name: &str,
    atm_profile: &AtmProfile,
    owned_prefix: &str,
    mut desired: BTreeMap<String, DesiredEndpoint>,
) -> Result<EndpointReconcileOutcome, EndpointWriteHalt> {
    let mut outcome = EndpointReconcileOutcome::default();

    // Pass 1: walk what the provider has; deletes happen here, before any
    // create or update below
    for existing in atm_profile.endpoints() {
        let Some(name) = existing.name.as_deref() else {
            warn!(
                profile = profile_name,
                "Azure returned an endpoint with no name; skipping"
            );
            continue;
        };

        if !is_owned_endpoint(name, owned_prefix) {
            debug!(endpoint = name, "Endpoint not owned by this backend; leaving untouched");
            continue;
        }

        let key = name.to_lowercase();
        if let Some(wanted) = desired.get(&key) {
            if wanted.matches(existing) {
                debug!(endpoint = name, "Endpoint already up to date");
                outcome.accepted.push(wanted.to_status());
                desired.remove(&key);
            }
            // Not equal: leave it in the desired map; the update pass
            // below rewrites it in place
            continue;
        }

        match traffic_manager
            .delete_endpoint(resource_group, profile_name, ATM_ENDPOINT_TYPE, name)
            .await
        {
            Ok(()) => {
                record_provider_endpoint_write("delete", true);
                info!(endpoint = name, profile = profile_name, "Deleted stale endpoint");
            }
            Err(e) if e.is_client_error() => {
                record_provider_endpoint_write("delete", false);
                outcome
                    .failures
                    .push(format!("failed to delete endpoint \"{name}\": {e}"));
            }
            Err(e) => {
                record_provider_endpoint_write("delete", false);
                return Err(EndpointWriteHalt {
                    endpoint: name.to_string(),
                    source: e,
                });
            }
        }
    }

    // Pass 2: create or update everything still desired
    for wanted in desired.values() {
        match traffic_manager
            .create_or_update_endpoint(
                resource_group,
                profile_name,
                ATM_ENDPOINT_TYPE,
                &wanted.name,
                &wanted.to_atm_endpoint(),
            )
            .await
        {
            Ok(_) => {
                record_provider_endpoint_write("create_or_update", true);
                info!(
                    endpoint = %wanted.name,
                    weight = wanted.weight,
                    profile = profile_name,
                    "Registered endpoint"
                );
                outcome.accepted.push(wanted.to_status());
            }
            Err(e) if e.is_client_error() => {
                record_provider_endpoint_write("create_or_update", false);
                outcome.failures.push(format!(
                    "failed to create or update endpoint \"{}\": {e}",
                    wanted.name
                ));
            }
            Err(e) => {
                record_provider_endpoint_write("create_or_update", false);
                return Err(EndpointWriteHalt {
                    endpoint: wanted.name.clone(),
                    source: e,
                });
            }
        }
    }

    outcome.accepted.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(outcome)
}

/// Delete every endpoint owned by the backend beneath the given profile.
///
/// Runs the deletions with bounded concurrency; the first failure that is
/// not a 404 cancels the remaining deletions and surfaces. Idempotent: a
/// second run over the same profile deletes nothing and succeeds.
///
/// # Returns
///
/// The number of owned endpoints that were submitted for deletion.
///
/// # Errors
///
/// Returns the first non-404 provider error.
pub async fn cleanup_endpoints(
    traffic_manager: &dyn TrafficManager,
    resource_group: &str,
    profile_name: &str,
    atm_profile: &AtmProfile,
    owned_prefix: &str,
) -> Result<usize, TrafficManagerError> {
    let owned: Vec<String> = atm_profile
        .endpoints()
        .iter()
        .filter_map(|e| e.name.clone())
        .filter(|name| is_owned_endpoint(name, owned_prefix))
        .collect();

    if owned.is_empty() {
        debug!(profile = profile_name, "No owned endpoints to clean up");
        return Ok(0);
    }

    let count = owned.len();
    info!(
        profile = profile_name,
        count, "Deleting owned Traffic Manager endpoints"
    );

    stream::iter(owned.into_iter().map(Ok))
        .try_for_each_concurrent(ENDPOINT_CLEANUP_CONCURRENCY, |name| async move {
            let result = traffic_manager
                .delete_endpoint(resource_group, profile_name, ATM_ENDPOINT_TYPE, &name)
                .await;
            record_provider_endpoint_write("delete", result.is_ok());
            result
        })
        .await?;

    Ok(count)
}
