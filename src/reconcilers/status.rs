// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Status condition helpers and the batched backend status writer.
//!
//! Conditions follow the standard Kubernetes format:
//! - `type`: the aspect being reported (here: `Accepted`)
//! - `status`: "True", "False", or "Unknown"
//! - `reason`: a programmatic CamelCase identifier
//! - `message`: a human-readable explanation
//! - `lastTransitionTime`: RFC3339 timestamp of the last status flip
//! - `observedGeneration`: the spec generation the condition was computed against
//!
//! Every decision path of the backend reconciler stages its outcome on a
//! [`BackendStatusUpdater`] and applies it exactly once. Conflicts on the
//! status write are swallowed: the watch event from the conflicting write
//! re-runs the reconcile against fresh state.

use anyhow::Result;
use chrono::Utc;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::debug;

use crate::crd::{Condition, TrafficManagerBackend, TrafficManagerEndpointStatus};
use crate::status_reasons::CONDITION_ACCEPTED;

/// Create a new Kubernetes condition with the current timestamp.
///
/// # Example
///
/// ```rust,no_run
/// # use fleetdns::reconcilers::status::create_condition;
/// let condition = create_condition(
///     "Accepted",
///     "True",
///     "Accepted",
///     "2 endpoint(s) are accepted"
/// );
/// assert_eq!(condition.r#type, "Accepted");
/// assert_eq!(condition.status, "True");
/// ```
#[must_use]
pub fn create_condition(
    condition_type: &str,
    status: &str,
    reason: &str,
    message: &str,
) -> Condition {
    Condition {
        r#type: condition_type.to_string(),
        status: status.to_string(),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
        last_transition_time: Some(Utc::now().to_rfc3339()),
        observed_generation: None,
    }
}

/// Check if a condition has changed compared to the existing status.
///
/// A condition is considered changed if the type, status, reason, message,
/// or observed generation differs. `lastTransitionTime` is not compared.
#[must_use]
pub fn condition_changed(existing: &Option<&Condition>, new_condition: &Condition) -> bool {
    if let Some(current) = existing {
        current.r#type != new_condition.r#type
            || current.status != new_condition.status
            || current.reason != new_condition.reason
            || current.message != new_condition.message
            || current.observed_generation != new_condition.observed_generation
    } else {
        true
    }
}

/// Find a condition by type in a list of conditions.
#[must_use]
pub fn find_condition<'a>(
    conditions: &'a [Condition],
    condition_type: &str,
) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.r#type == condition_type)
}

/// Batched status writer for `TrafficManagerBackend`.
///
/// Reconcile paths stage the `Accepted` condition and the endpoint list
/// here, then call [`BackendStatusUpdater::apply`] once. The updater:
/// - stamps `observedGeneration` from the generation captured at creation,
/// - preserves `lastTransitionTime` when the condition status did not flip,
/// - skips the write entirely when nothing changed (avoids reconcile loops),
/// - treats a write conflict as success.
pub struct BackendStatusUpdater {
    namespace: String,
    name: String,
    generation: Option<i64>,
    existing_condition: Option<Condition>,
    existing_endpoints: Vec<TrafficManagerEndpointStatus>,
    condition: Option<Condition>,
    endpoints: Option<Vec<TrafficManagerEndpointStatus>>,
}

impl BackendStatusUpdater {
    /// Capture the backend's identity and current status as the baseline.
    #[must_use]
    pub fn new(backend: &TrafficManagerBackend) -> Self {
        let existing_condition = backend.accepted_condition().cloned();
        let existing_endpoints = backend
            .status
            .as_ref()
            .map(|s| s.endpoints.clone())
            .unwrap_or_default();

        Self {
            namespace: backend.namespace().unwrap_or_default(),
            name: backend.name_any(),
            generation: backend.metadata.generation,
            existing_condition,
            existing_endpoints,
            condition: None,
            endpoints: None,
        }
    }

    /// Stage the `Accepted` condition.
    pub fn set_accepted(&mut self, status: &str, reason: &str, message: &str) {
        self.condition = Some(create_condition(CONDITION_ACCEPTED, status, reason, message));
    }

    /// Stage the accepted endpoint list.
    pub fn set_endpoints(&mut self, endpoints: Vec<TrafficManagerEndpointStatus>) {
        self.endpoints = Some(endpoints);
    }

    /// Stage an empty endpoint list (weight zero, missing import).
    pub fn clear_endpoints(&mut self) {
        self.endpoints = Some(Vec::new());
    }

    /// The condition staged so far, if any. Used by tests and logging.
    #[must_use]
    pub fn staged_condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    /// Apply the staged status in a single write.
    ///
    /// # Errors
    ///
    /// Returns an error if the status patch fails for any reason other than
    /// a write conflict.
    pub async fn apply(&self, client: &Client) -> Result<()> {
        let Some(staged) = &self.condition else {
            debug!(
                "No condition staged for TrafficManagerBackend {}/{}; skipping status write",
                self.namespace, self.name
            );
            return Ok(());
        };

        let mut condition = staged.clone();
        condition.observed_generation = self.generation;

        // Keep the transition timestamp stable while the status holds
        if let Some(existing) = &self.existing_condition {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time.clone();
            }
        }

        let endpoints = self
            .endpoints
            .clone()
            .unwrap_or_else(|| self.existing_endpoints.clone());

        if !condition_changed(&self.existing_condition.as_ref(), &condition)
            && endpoints == self.existing_endpoints
        {
            debug!(
                "Status unchanged for TrafficManagerBackend {}/{}; skipping write",
                self.namespace, self.name
            );
            return Ok(());
        }

        let api: Api<TrafficManagerBackend> =
            Api::namespaced(client.clone(), &self.namespace);
        let patch = json!({
            "status": {
                "conditions": [condition],
                "endpoints": endpoints,
            }
        });

        match api
            .patch_status(&self.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => {
                // The conflicting write re-fires the watch; the next
                // reconcile observes fresh state
                debug!(
                    "Conflict writing status for TrafficManagerBackend {}/{}; relying on requeue",
                    self.namespace, self.name
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
