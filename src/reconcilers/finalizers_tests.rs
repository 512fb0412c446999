// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `finalizers.rs`

#[cfg(test)]
mod tests {
    use crate::crd::{
        BackendReference, ProfileReference, TrafficManagerBackend, TrafficManagerBackendSpec,
    };
    use crate::labels::FINALIZER_TRAFFIC_MANAGER_BACKEND;
    use crate::reconcilers::finalizers::ensure_finalizer;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
    use k8s_openapi::jiff::Timestamp;
    use kube::Client;

    const TEST_NAMESPACE: &str = "team-a";
    const TEST_NAME: &str = "store-backend";

    fn test_backend(
        finalizers: Option<Vec<String>>,
        deleted: bool,
    ) -> TrafficManagerBackend {
        TrafficManagerBackend {
            metadata: ObjectMeta {
                name: Some(TEST_NAME.to_string()),
                namespace: Some(TEST_NAMESPACE.to_string()),
                finalizers,
                deletion_timestamp: deleted.then(|| Time(Timestamp::now())),
                generation: Some(1),
                ..Default::default()
            },
            spec: TrafficManagerBackendSpec {
                profile: ProfileReference {
                    name: "team-a-profile".to_string(),
                },
                backend: BackendReference {
                    name: "store".to_string(),
                },
                weight: None,
            },
            status: None,
        }
    }

    #[test]
    fn test_finalizer_string_is_domain_qualified() {
        // Kubernetes requires qualified finalizer names outside the core group
        assert!(FINALIZER_TRAFFIC_MANAGER_BACKEND.contains('/'));
        assert!(FINALIZER_TRAFFIC_MANAGER_BACKEND.starts_with("fleetdns.firestoned.io/"));
    }

    #[test]
    fn test_finalizer_presence_detection() {
        let without = test_backend(None, false);
        assert!(without
            .metadata
            .finalizers
            .as_ref()
            .is_none_or(|f| !f.contains(&FINALIZER_TRAFFIC_MANAGER_BACKEND.to_string())));

        let with = test_backend(
            Some(vec![FINALIZER_TRAFFIC_MANAGER_BACKEND.to_string()]),
            false,
        );
        assert!(with
            .metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.contains(&FINALIZER_TRAFFIC_MANAGER_BACKEND.to_string())));
    }

    #[test]
    fn test_foreign_finalizers_do_not_count_as_ours() {
        let foreign = test_backend(Some(vec!["other.io/cleanup".to_string()]), true);
        assert!(!foreign
            .metadata
            .finalizers
            .as_ref()
            .unwrap()
            .contains(&FINALIZER_TRAFFIC_MANAGER_BACKEND.to_string()));
    }

    #[tokio::test]
    #[ignore] // Requires a Kubernetes cluster
    async fn test_ensure_finalizer_adds_when_missing() {
        let client = Client::try_default().await.expect("cluster client");
        let backend = test_backend(None, false);

        let added = ensure_finalizer(&client, &backend, FINALIZER_TRAFFIC_MANAGER_BACKEND)
            .await
            .expect("patch should succeed");
        assert!(added);
    }

    #[tokio::test]
    #[ignore] // Requires a Kubernetes cluster
    async fn test_ensure_finalizer_is_idempotent() {
        let client = Client::try_default().await.expect("cluster client");
        let backend = test_backend(
            Some(vec![FINALIZER_TRAFFIC_MANAGER_BACKEND.to_string()]),
            false,
        );

        let added = ensure_finalizer(&client, &backend, FINALIZER_TRAFFIC_MANAGER_BACKEND)
            .await
            .expect("no-op should succeed");
        assert!(!added);
    }
}
