// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Precondition validators for `TrafficManagerBackend` reconciliation.
//!
//! Each validator either hands the fetched dependency to the caller or
//! short-circuits the reconcile with a staged status:
//!
//! - [`ValidationOutcome::Proceed`] - the dependency is usable;
//! - [`ValidationOutcome::Stop`] - a terminal condition was staged; a later
//!   watch event re-fires when the dependency changes;
//! - [`ValidationOutcome::Retry`] - a transient failure was staged as
//!   `Pending`; the error requeues the reconcile with backoff.
//!
//! The caller applies the staged status exactly once per reconcile.

use kube::{Api, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::azure::traffic_manager::AtmProfile;
use crate::context::Context;
use crate::crd::{InternalServiceExport, ServiceImport, TrafficManagerBackend, TrafficManagerProfile};
use crate::reconcilers::retry::retry_api_call;
use crate::reconcilers::status::BackendStatusUpdater;
use crate::reconcilers::is_kube_not_found;
use crate::status_reasons::{
    REASON_ACCEPTED, REASON_INVALID, REASON_PENDING, STATUS_FALSE, STATUS_TRUE, STATUS_UNKNOWN,
};

use super::endpoints;

/// Outcome of a precondition check.
pub enum ValidationOutcome<T> {
    /// Dependency is usable; continue reconciling with it.
    Proceed(T),
    /// A terminal status was staged; end the reconcile without error.
    Stop,
    /// A transient failure was staged; end the reconcile with a retry.
    Retry(anyhow::Error),
}

/// Validate the parent `TrafficManagerProfile`.
///
/// The profile must exist in the backend's namespace and carry
/// `Programmed=True` computed against its current generation. Anything else
/// is either terminal (`Invalid`) or worth waiting for (`Pending`).
pub async fn validate_profile(
    ctx: &Context,
    backend: &TrafficManagerBackend,
    updater: &mut BackendStatusUpdater,
) -> ValidationOutcome<TrafficManagerProfile> {
    let namespace = backend.namespace().unwrap_or_default();
    let profile_name = &backend.spec.profile.name;
    let api: Api<TrafficManagerProfile> = Api::namespaced(ctx.client.clone(), &namespace);

    let profile = match retry_api_call(
        || async { api.get(profile_name).await },
        "get TrafficManagerProfile",
    )
    .await
    {
        Ok(profile) => profile,
        Err(e)
            if e.downcast_ref::<kube::Error>()
                .is_some_and(is_kube_not_found) =>
        {
            info!(
                profile = %profile_name,
                namespace = %namespace,
                "Referenced TrafficManagerProfile not found"
            );
            updater.set_accepted(
                STATUS_FALSE,
                REASON_INVALID,
                &format!("TrafficManagerProfile \"{profile_name}\" is not found"),
            );
            return ValidationOutcome::Stop;
        }
        Err(e) => {
            updater.set_accepted(
                STATUS_UNKNOWN,
                REASON_PENDING,
                &format!("failed to read TrafficManagerProfile \"{profile_name}\"; retrying"),
            );
            return ValidationOutcome::Retry(e);
        }
    };

    match profile.programmed_condition() {
        Some(condition)
            if condition.status == STATUS_TRUE
                && condition.observed_generation == profile.metadata.generation =>
        {
            ValidationOutcome::Proceed(profile)
        }
        Some(condition) if condition.status == STATUS_FALSE => {
            let detail = condition
                .message
                .clone()
                .unwrap_or_else(|| "the profile is not programmed".to_string());
            updater.set_accepted(
                STATUS_FALSE,
                REASON_INVALID,
                &format!("TrafficManagerProfile \"{profile_name}\" is invalid: {detail}"),
            );
            ValidationOutcome::Stop
        }
        _ => {
            // Unknown, absent, or computed against a stale generation
            updater.set_accepted(
                STATUS_UNKNOWN,
                REASON_PENDING,
                &format!(
                    "TrafficManagerProfile \"{profile_name}\" is not programmed yet; waiting"
                ),
            );
            ValidationOutcome::Stop
        }
    }
}

/// Fetch the external Azure Traffic Manager profile backing the parent.
///
/// A provider 404 here means operator drift or a half-deleted parent: the
/// hub object claims `Programmed=True` but Azure has nothing. That is
/// terminal until the profile reconciler repairs it.
pub async fn fetch_external_profile(
    ctx: &Context,
    profile: &TrafficManagerProfile,
    atm_profile_name: &str,
    updater: &mut BackendStatusUpdater,
) -> ValidationOutcome<AtmProfile> {
    let resource_group = &profile.spec.resource_group;

    match ctx
        .traffic_manager
        .get_profile(resource_group, atm_profile_name)
        .await
    {
        Ok(atm_profile) => ValidationOutcome::Proceed(atm_profile),
        Err(e) if e.is_not_found() => {
            warn!(
                profile = atm_profile_name,
                resource_group = %resource_group,
                "External Traffic Manager profile missing despite Programmed=True"
            );
            updater.set_accepted(
                STATUS_FALSE,
                REASON_INVALID,
                &format!(
                    "Azure Traffic Manager profile \"{atm_profile_name}\" under resource group \"{resource_group}\" is not found"
                ),
            );
            ValidationOutcome::Stop
        }
        Err(e) => {
            updater.set_accepted(
                STATUS_UNKNOWN,
                REASON_PENDING,
                &format!(
                    "failed to read Azure Traffic Manager profile \"{atm_profile_name}\" under resource group \"{resource_group}\"; retrying"
                ),
            );
            ValidationOutcome::Retry(e.into())
        }
    }
}

/// Validate the referenced `ServiceImport`.
///
/// A missing import is the signal that the service stopped being exported:
/// every endpoint this backend owns is deleted before the terminal status is
/// staged. An import with no clusters yet is a replication race worth
/// waiting out.
pub async fn validate_service_import(
    ctx: &Context,
    backend: &TrafficManagerBackend,
    resource_group: &str,
    atm_profile_name: &str,
    atm_profile: &AtmProfile,
    owned_prefix: &str,
    updater: &mut BackendStatusUpdater,
) -> ValidationOutcome<ServiceImport> {
    let namespace = backend.namespace().unwrap_or_default();
    let import_name = &backend.spec.backend.name;
    let api: Api<ServiceImport> = Api::namespaced(ctx.client.clone(), &namespace);

    let import = match retry_api_call(
        || async { api.get(import_name).await },
        "get ServiceImport",
    )
    .await
    {
        Ok(import) => import,
        Err(e)
            if e.downcast_ref::<kube::Error>()
                .is_some_and(is_kube_not_found) =>
        {
            info!(
                import = %import_name,
                namespace = %namespace,
                "Referenced ServiceImport not found; removing owned endpoints"
            );
            if let Err(cleanup_err) = endpoints::cleanup_endpoints(
                ctx.traffic_manager.as_ref(),
                resource_group,
                atm_profile_name,
                atm_profile,
                owned_prefix,
            )
            .await
            {
                updater.set_accepted(
                    STATUS_UNKNOWN,
                    REASON_PENDING,
                    &format!(
                        "ServiceImport \"{import_name}\" is gone but endpoint cleanup failed; retrying"
                    ),
                );
                return ValidationOutcome::Retry(cleanup_err.into());
            }

            updater.set_accepted(
                STATUS_FALSE,
                REASON_INVALID,
                &format!("ServiceImport \"{import_name}\" is not found"),
            );
            updater.clear_endpoints();
            return ValidationOutcome::Stop;
        }
        Err(e) => {
            updater.set_accepted(
                STATUS_UNKNOWN,
                REASON_PENDING,
                &format!("failed to read ServiceImport \"{import_name}\"; retrying"),
            );
            return ValidationOutcome::Retry(e);
        }
    };

    let has_clusters = import
        .status
        .as_ref()
        .is_some_and(|status| !status.clusters.is_empty());

    if !has_clusters {
        updater.set_accepted(
            STATUS_UNKNOWN,
            REASON_PENDING,
            &format!(
                "ServiceImport \"{import_name}\" is in the process of exporting services; no clusters are registered yet"
            ),
        );
        return ValidationOutcome::Stop;
    }

    ValidationOutcome::Proceed(import)
}

/// Export records for the import's clusters, split into eligible and
/// invalid.
pub struct ClassifiedExports {
    /// Exports that can become Traffic Manager endpoints.
    pub eligible: Vec<Arc<InternalServiceExport>>,
    /// Cluster ID to ineligibility reason, for status reporting.
    pub invalid: BTreeMap<String, String>,
}

/// Resolve and classify the per-cluster export records behind an import.
///
/// Every cluster in the import's status must have a matching export record
/// in the store; a gap means the import is ahead of export replication and
/// the reconcile waits.
pub fn gather_exports(
    stores: &crate::context::Stores,
    import: &ServiceImport,
    updater: &mut BackendStatusUpdater,
) -> ValidationOutcome<ClassifiedExports> {
    let namespace = import.namespace().unwrap_or_default();
    let import_name = import.name_any();
    let namespaced_name = format!("{namespace}/{import_name}");

    let clusters: Vec<String> = import
        .status
        .as_ref()
        .map(|s| s.clusters.iter().map(|c| c.cluster.clone()).collect())
        .unwrap_or_default();

    let mut eligible = Vec::new();
    let mut invalid = BTreeMap::new();

    for cluster_id in &clusters {
        let Some(export) = stores.export_for_cluster(&namespaced_name, cluster_id) else {
            updater.set_accepted(
                STATUS_UNKNOWN,
                REASON_PENDING,
                &format!(
                    "service export from cluster \"{cluster_id}\" has not replicated to the hub yet; waiting"
                ),
            );
            return ValidationOutcome::Stop;
        };

        match export_eligibility_error(&export) {
            None => eligible.push(export),
            Some(reason) => {
                invalid.insert(cluster_id.clone(), reason);
            }
        }
    }

    ValidationOutcome::Proceed(ClassifiedExports { eligible, invalid })
}

/// Why an export cannot become a Traffic Manager endpoint, if it cannot.
///
/// Azure endpoints require a public, DNS-labeled LoadBalancer service; each
/// check maps to one user-fixable condition in the member cluster.
#[must_use]
pub fn export_eligibility_error(export: &InternalServiceExport) -> Option<String> {
    if export.spec.r#type != "LoadBalancer" {
        return Some(format!(
            "service type must be LoadBalancer, got \"{}\"",
            export.spec.r#type
        ));
    }
    if export.spec.is_internal_load_balancer {
        return Some("internal load balancers cannot be exposed".to_string());
    }
    if !export.spec.is_dns_label_configured {
        return Some("no DNS label is configured on the public IP".to_string());
    }
    if export.spec.public_ip_resource_id.is_none() {
        return Some("the public IP resource ID is missing".to_string());
    }
    None
}

/// Stage the steady-state `Accepted=True` condition for a weight-zero
/// backend after its endpoints were removed.
pub fn stage_weight_zero_accepted(updater: &mut BackendStatusUpdater) {
    updater.set_accepted(
        STATUS_TRUE,
        REASON_ACCEPTED,
        "no endpoints are registered because the backend weight is 0",
    );
    updater.clear_endpoints();
}
