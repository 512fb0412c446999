// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `TrafficManagerBackend` reconciliation logic.
//!
//! The reconcile translates a backend (profile reference + service-import
//! reference + total weight) into a set of weighted Azure Traffic Manager
//! endpoints, one per eligible member cluster, and keeps them converged
//! across cluster churn, partial provider failures, and upstream changes.
//!
//! Every run is stateless: desired state is rebuilt from the observed
//! objects and the provider's own endpoint list, and the single `Accepted`
//! condition summarizes the outcome.

pub mod desired;
pub mod endpoints;
pub mod validation;

#[cfg(test)]
#[path = "desired_tests.rs"]
mod desired_tests;
#[cfg(test)]
#[path = "endpoints_tests.rs"]
mod endpoints_tests;

use anyhow::{bail, Result};
use kube::{Api, ResourceExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::context::Context;
use crate::crd::TrafficManagerBackend;
use crate::labels::FINALIZER_TRAFFIC_MANAGER_BACKEND;
use crate::reconcilers::finalizers::{ensure_finalizer, handle_deletion, FinalizerCleanup};
use crate::reconcilers::is_kube_not_found;
use crate::reconcilers::status::BackendStatusUpdater;
use crate::status_reasons::{
    REASON_ACCEPTED, REASON_INVALID, REASON_PENDING, STATUS_FALSE, STATUS_TRUE, STATUS_UNKNOWN,
};

use desired::endpoint_prefix;
use endpoints::EndpointReconcileOutcome;
use validation::ValidationOutcome;

/// Re-fetch a backend to get the latest spec and status.
///
/// The object from the watch event may carry stale status from the cache;
/// the status updater needs the current baseline to detect no-op writes.
async fn refetch_backend(
    client: &kube::Client,
    namespace: &str,
    name: &str,
) -> Result<Option<TrafficManagerBackend>, kube::Error> {
    let api: Api<TrafficManagerBackend> = Api::namespaced(client.clone(), namespace);
    match api.get(name).await {
        Ok(backend) => Ok(Some(backend)),
        Err(e) if is_kube_not_found(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

#[async_trait::async_trait]
impl FinalizerCleanup for TrafficManagerBackend {
    async fn cleanup(&self, ctx: &Context) -> Result<()> {
        cleanup_trafficmanagerbackend(ctx, self).await
    }
}

/// Reconcile a `TrafficManagerBackend`.
///
/// Dispatches deletion, manages the finalizer, validates the upstream
/// dependencies, converges the provider endpoints, and writes the `Accepted`
/// condition exactly once.
///
/// # Errors
///
/// Returns an error only for transient failures (storage or provider); the
/// controller requeues those with backoff. Terminal conditions are reported
/// through status and return `Ok`.
#[allow(clippy::too_many_lines)]
pub async fn reconcile_trafficmanagerbackend(
    ctx: Arc<Context>,
    backend: TrafficManagerBackend,
) -> Result<()> {
    let client = ctx.client.clone();
    let namespace = backend.namespace().unwrap_or_default();
    let name = backend.name_any();

    info!("Reconciling TrafficManagerBackend {}/{}", namespace, name);

    if backend.metadata.deletion_timestamp.is_some() {
        return handle_deletion(&ctx, &backend, FINALIZER_TRAFFIC_MANAGER_BACKEND).await;
    }

    if ensure_finalizer(&client, &backend, FINALIZER_TRAFFIC_MANAGER_BACKEND).await? {
        // The finalizer persist re-fires the watch; pick the work up there
        debug!(
            "Finalizer added to TrafficManagerBackend {}/{}; ending this pass",
            namespace, name
        );
        return Ok(());
    }

    // Re-fetch for a current status baseline; a vanished backend is not an error
    let Some(backend) = refetch_backend(&client, &namespace, &name).await? else {
        debug!(
            "TrafficManagerBackend {}/{} deleted during reconcile",
            namespace, name
        );
        return Ok(());
    };

    let Some(backend_uid) = backend.metadata.uid.clone() else {
        bail!("TrafficManagerBackend {namespace}/{name} has no UID");
    };
    let total_weight = backend.effective_weight();
    let mut updater = BackendStatusUpdater::new(&backend);

    // Precondition 1: parent profile exists and is programmed
    let profile = match validation::validate_profile(&ctx, &backend, &mut updater).await {
        ValidationOutcome::Proceed(profile) => profile,
        ValidationOutcome::Stop => {
            updater.apply(&client).await?;
            return Ok(());
        }
        ValidationOutcome::Retry(e) => {
            updater.apply(&client).await?;
            return Err(e);
        }
    };

    let resource_group = profile.spec.resource_group.clone();
    let Some(atm_profile_name) = profile.atm_profile_name() else {
        // A profile without a UID has not been persisted properly yet
        updater.set_accepted(
            STATUS_UNKNOWN,
            REASON_PENDING,
            &format!(
                "TrafficManagerProfile \"{}\" has no UID yet; waiting",
                backend.spec.profile.name
            ),
        );
        updater.apply(&client).await?;
        return Ok(());
    };

    // Precondition 2: the external Azure profile exists
    let atm_profile =
        match validation::fetch_external_profile(&ctx, &profile, &atm_profile_name, &mut updater)
            .await
        {
            ValidationOutcome::Proceed(atm_profile) => atm_profile,
            ValidationOutcome::Stop => {
                updater.apply(&client).await?;
                return Ok(());
            }
            ValidationOutcome::Retry(e) => {
                updater.apply(&client).await?;
                return Err(e);
            }
        };

    let owned_prefix = endpoint_prefix(&backend_uid);

    // Precondition 3: the service import exists and has exporting clusters
    let import = match validation::validate_service_import(
        &ctx,
        &backend,
        &resource_group,
        &atm_profile_name,
        &atm_profile,
        &owned_prefix,
        &mut updater,
    )
    .await
    {
        ValidationOutcome::Proceed(import) => import,
        ValidationOutcome::Stop => {
            updater.apply(&client).await?;
            return Ok(());
        }
        ValidationOutcome::Retry(e) => {
            updater.apply(&client).await?;
            return Err(e);
        }
    };

    // Weight 0: unconditional cleanup, then steady state with no endpoints
    if total_weight == 0 {
        if let Err(e) = endpoints::cleanup_endpoints(
            ctx.traffic_manager.as_ref(),
            &resource_group,
            &atm_profile_name,
            &atm_profile,
            &owned_prefix,
        )
        .await
        {
            updater.set_accepted(
                STATUS_UNKNOWN,
                REASON_PENDING,
                &format!(
                    "failed to remove endpoints from Azure Traffic Manager profile \"{atm_profile_name}\"; retrying"
                ),
            );
            updater.apply(&client).await?;
            return Err(e.into());
        }

        validation::stage_weight_zero_accepted(&mut updater);
        updater.apply(&client).await?;
        return Ok(());
    }

    // Precondition 4: every exporting cluster has a replicated export record
    let classified = match validation::gather_exports(&ctx.stores, &import, &mut updater) {
        ValidationOutcome::Proceed(classified) => classified,
        ValidationOutcome::Stop => {
            updater.apply(&client).await?;
            return Ok(());
        }
        ValidationOutcome::Retry(e) => {
            updater.apply(&client).await?;
            return Err(e);
        }
    };

    // Desired state, then converge the provider
    let desired_map = desired::build_desired_endpoints(
        &backend_uid,
        &backend.spec.backend.name,
        total_weight,
        &classified.eligible,
    );

    let outcome = match endpoints::reconcile_endpoints(
        ctx.traffic_manager.as_ref(),
        &resource_group,
        &atm_profile_name,
        &atm_profile,
        &owned_prefix,
        desired_map,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(halt) => {
            updater.set_accepted(
                STATUS_UNKNOWN,
                REASON_PENDING,
                &format!(
                    "failed to reconcile endpoint \"{}\" in Azure Traffic Manager profile \"{}\"; retrying",
                    halt.endpoint, atm_profile_name
                ),
            );
            updater.apply(&client).await?;
            return Err(halt.into());
        }
    };

    stage_final_status(&mut updater, &outcome, &classified.invalid);
    updater.apply(&client).await?;

    info!(
        "Reconciled TrafficManagerBackend {}/{}: {} endpoint(s) accepted, {} failed, {} invalid export(s)",
        namespace,
        name,
        outcome.accepted.len(),
        outcome.failures.len(),
        classified.invalid.len()
    );

    Ok(())
}

/// Aggregate the reconcile outcome into the final `Accepted` condition.
///
/// Clean outcome: `Accepted=True` with the accepted count. Anything else:
/// `Accepted=False` enumerating the first write failure and the first
/// invalid export, with the (possibly partial) accepted list kept in status.
fn stage_final_status(
    updater: &mut BackendStatusUpdater,
    outcome: &EndpointReconcileOutcome,
    invalid_services: &BTreeMap<String, String>,
) {
    updater.set_endpoints(outcome.accepted.clone());

    if outcome.failures.is_empty() && invalid_services.is_empty() {
        updater.set_accepted(
            STATUS_TRUE,
            REASON_ACCEPTED,
            &format!(
                "{} endpoint(s) are accepted in the Azure Traffic Manager profile",
                outcome.accepted.len()
            ),
        );
        return;
    }

    let mut parts = Vec::new();
    if !outcome.failures.is_empty() {
        parts.push(format!(
            "{} endpoint(s) failed to be created/updated in the Azure Traffic Manager, for example, {}",
            outcome.failures.len(),
            outcome.failures[0]
        ));
    }
    if let Some((cluster, reason)) = invalid_services.iter().next() {
        parts.push(format!(
            "{} service(s) exported from clusters cannot be exposed, for example, service exported from {} is invalid: {}",
            invalid_services.len(),
            cluster,
            reason
        ));
    }

    updater.set_accepted(STATUS_FALSE, REASON_INVALID, &parts.join("; "));
}

/// Delete every provider endpoint owned by a backend before its finalizer
/// is released.
///
/// When the parent profile object or its external counterpart no longer
/// exists, there is nothing left to own and cleanup is vacuously done.
///
/// # Errors
///
/// Returns an error on transient storage or provider failures; the delete
/// stays blocked and is retried by the next event.
pub async fn cleanup_trafficmanagerbackend(
    ctx: &Context,
    backend: &TrafficManagerBackend,
) -> Result<()> {
    let namespace = backend.namespace().unwrap_or_default();
    let name = backend.name_any();
    let profile_name = &backend.spec.profile.name;

    let api: Api<crate::crd::TrafficManagerProfile> =
        Api::namespaced(ctx.client.clone(), &namespace);
    let profile = match api.get(profile_name).await {
        Ok(profile) => profile,
        Err(e) if is_kube_not_found(&e) => {
            info!(
                "Parent profile {}/{} already gone; nothing to clean up for backend {}",
                namespace, profile_name, name
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let Some(atm_profile_name) = profile.atm_profile_name() else {
        return Ok(());
    };
    let resource_group = &profile.spec.resource_group;

    let atm_profile = match ctx
        .traffic_manager
        .get_profile(resource_group, &atm_profile_name)
        .await
    {
        Ok(atm_profile) => atm_profile,
        Err(e) if e.is_not_found() => {
            info!(
                "External profile {} already gone; nothing to clean up for backend {}/{}",
                atm_profile_name, namespace, name
            );
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let Some(backend_uid) = backend.metadata.uid.as_deref() else {
        return Ok(());
    };

    let deleted = endpoints::cleanup_endpoints(
        ctx.traffic_manager.as_ref(),
        resource_group,
        &atm_profile_name,
        &atm_profile,
        &endpoint_prefix(backend_uid),
    )
    .await?;

    info!(
        "Deleted {} endpoint(s) owned by TrafficManagerBackend {}/{}",
        deleted, namespace, name
    );

    Ok(())
}
