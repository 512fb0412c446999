// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Generic finalizer management for Kubernetes resources.
//!
//! This module provides reusable functions for adding, removing, and handling
//! finalizers on namespaced custom resources. The deletion protocol is:
//! external cleanup first, finalizer removal second, so a resource can never
//! disappear while provider-side state it owns still exists.
//!
//! # Example
//!
//! ```rust,ignore
//! use fleetdns::reconcilers::finalizers::{ensure_finalizer, handle_deletion, FinalizerCleanup};
//! use fleetdns::context::Context;
//! use fleetdns::crd::TrafficManagerBackend;
//! use anyhow::Result;
//!
//! const FINALIZER: &str = "fleetdns.firestoned.io/trafficmanagerbackend-cleanup";
//!
//! async fn reconcile(ctx: std::sync::Arc<Context>, backend: TrafficManagerBackend) -> Result<()> {
//!     if backend.metadata.deletion_timestamp.is_some() {
//!         return handle_deletion(&ctx, &backend, FINALIZER).await;
//!     }
//!     if ensure_finalizer(&ctx.client, &backend, FINALIZER).await? {
//!         // Persisting the finalizer re-triggers the watch; nothing else to do.
//!         return Ok(());
//!     }
//!     // Normal reconciliation...
//!     Ok(())
//! }
//! ```

use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::core::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use serde_json::json;
use tracing::info;

use crate::context::Context;

/// Trait for resources that must clean up external state before deletion.
///
/// Implement this trait to define cleanup logic that runs while the
/// finalizer is still present on a deleted resource.
#[async_trait::async_trait]
pub trait FinalizerCleanup: Resource + ResourceExt + Clone {
    /// Perform cleanup operations before the finalizer is removed.
    ///
    /// Called when a resource with a deletion timestamp still carries the
    /// finalizer.
    ///
    /// # Errors
    ///
    /// If this method returns an error, the finalizer is NOT removed and
    /// deletion stays blocked until a later reconcile succeeds.
    async fn cleanup(&self, ctx: &Context) -> Result<()>;
}

/// Add a finalizer to a resource if not already present.
///
/// Idempotent. Returns `true` when the finalizer was actually added (and
/// persisted), `false` when it was already there. Callers should end the
/// reconcile after an add: the persist fires a fresh watch event with the
/// finalizer in place.
///
/// # Errors
///
/// Returns an error if the API patch operation fails.
pub async fn ensure_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<bool>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    if resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.contains(&finalizer.to_string()))
    {
        return Ok(false);
    }

    info!(
        "Adding finalizer {} to {}/{} {}",
        finalizer,
        namespace,
        name,
        T::kind(&())
    );

    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.push(finalizer.to_string());

    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;

    Ok(true)
}

/// Remove a finalizer from a resource.
///
/// Idempotent; a conflict on the patch is swallowed because the deletion
/// watch event that follows will re-run the delete path against the fresh
/// object.
///
/// # Errors
///
/// Returns an error if the API patch fails for any reason other than a
/// write conflict.
pub async fn remove_finalizer<T>(client: &Client, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    if resource
        .meta()
        .finalizers
        .as_ref()
        .is_none_or(|f| !f.contains(&finalizer.to_string()))
    {
        return Ok(());
    }

    info!(
        "Removing finalizer {} from {}/{} {}",
        finalizer,
        namespace,
        name,
        T::kind(&())
    );

    let mut finalizers = resource.meta().finalizers.clone().unwrap_or_default();
    finalizers.retain(|f| f != finalizer);

    let api: Api<T> = Api::namespaced(client.clone(), &namespace);
    let patch = json!({ "metadata": { "finalizers": finalizers } });
    match api
        .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
        .await
    {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(e)) if e.code == 409 => {
            // The storage layer re-fires on the conflicting write
            tracing::debug!(
                "Conflict removing finalizer from {}/{}; a later event retries",
                namespace,
                name
            );
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Handle resource deletion with cleanup and finalizer removal.
///
/// 1. If the finalizer is absent there is nothing to do.
/// 2. Otherwise run the resource's [`FinalizerCleanup::cleanup`].
/// 3. On success remove the finalizer, unblocking the delete.
///
/// # Errors
///
/// Returns an error if cleanup or finalizer removal fails; the finalizer
/// stays on the resource and deletion remains blocked until a subsequent
/// reconcile succeeds.
pub async fn handle_deletion<T>(ctx: &Context, resource: &T, finalizer: &str) -> Result<()>
where
    T: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + ResourceExt
        + FinalizerCleanup
        + Clone
        + std::fmt::Debug
        + serde::Serialize
        + for<'de> serde::Deserialize<'de>,
{
    let namespace = resource.namespace().unwrap_or_default();
    let name = resource.name_any();

    info!("{} {}/{} is being deleted", T::kind(&()), namespace, name);

    if resource
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.contains(&finalizer.to_string()))
    {
        info!(
            "Running cleanup for {} {}/{}",
            T::kind(&()),
            namespace,
            name
        );

        resource.cleanup(ctx).await?;

        remove_finalizer(&ctx.client, resource, finalizer).await?;
    }

    Ok(())
}

#[cfg(test)]
#[path = "finalizers_tests.rs"]
mod finalizers_tests;
