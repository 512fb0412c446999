// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `endpoints.rs` against an in-memory provider fake.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    use crate::azure::traffic_manager::{
        AtmEndpoint, AtmEndpointProperties, AtmProfile, AtmProfileProperties,
    };
    use crate::azure::{TrafficManager, TrafficManagerError};
    use crate::reconcilers::trafficmanagerbackend::desired::{
        endpoint_name, endpoint_prefix, DesiredEndpoint,
    };
    use crate::reconcilers::trafficmanagerbackend::endpoints::{
        cleanup_endpoints, reconcile_endpoints,
    };

    const BACKEND_UID: &str = "11111111-2222-3333-4444-555555555555";
    const RESOURCE_GROUP: &str = "fleet-rg";
    const PROFILE: &str = "fleet-profile-uid";

    /// Operation log entry: ("delete" | "put", endpoint name)
    type Op = (&'static str, String);

    #[derive(Default)]
    struct FakeState {
        ops: Vec<Op>,
        fail_client: HashSet<String>,
        fail_throttled: HashSet<String>,
    }

    #[derive(Default)]
    struct FakeTrafficManager {
        state: Mutex<FakeState>,
    }

    impl FakeTrafficManager {
        fn failing_client(endpoints: &[&str]) -> Self {
            let fake = Self::default();
            fake.state.lock().unwrap().fail_client =
                endpoints.iter().map(|s| (*s).to_string()).collect();
            fake
        }

        fn failing_throttled(endpoints: &[&str]) -> Self {
            let fake = Self::default();
            fake.state.lock().unwrap().fail_throttled =
                endpoints.iter().map(|s| (*s).to_string()).collect();
            fake
        }

        fn ops(&self) -> Vec<Op> {
            self.state.lock().unwrap().ops.clone()
        }
    }

    #[async_trait]
    impl TrafficManager for FakeTrafficManager {
        async fn get_profile(
            &self,
            _resource_group: &str,
            profile_name: &str,
        ) -> Result<AtmProfile, TrafficManagerError> {
            Ok(AtmProfile {
                name: Some(profile_name.to_string()),
                ..AtmProfile::default()
            })
        }

        async fn create_or_update_endpoint(
            &self,
            _resource_group: &str,
            _profile_name: &str,
            _endpoint_type: &str,
            endpoint_name: &str,
            endpoint: &AtmEndpoint,
        ) -> Result<AtmEndpoint, TrafficManagerError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_client.contains(endpoint_name) {
                return Err(TrafficManagerError::Client {
                    status: 400,
                    message: "bad target".into(),
                });
            }
            if state.fail_throttled.contains(endpoint_name) {
                return Err(TrafficManagerError::Throttled {
                    retry_after_secs: Some(5),
                });
            }
            state.ops.push(("put", endpoint_name.to_string()));
            Ok(endpoint.clone())
        }

        async fn delete_endpoint(
            &self,
            _resource_group: &str,
            _profile_name: &str,
            _endpoint_type: &str,
            endpoint_name: &str,
        ) -> Result<(), TrafficManagerError> {
            let mut state = self.state.lock().unwrap();
            if state.fail_client.contains(endpoint_name) {
                return Err(TrafficManagerError::Client {
                    status: 403,
                    message: "forbidden".into(),
                });
            }
            if state.fail_throttled.contains(endpoint_name) {
                return Err(TrafficManagerError::Server {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            state.ops.push(("delete", endpoint_name.to_string()));
            Ok(())
        }
    }

    fn provider_endpoint(name: &str, target: &str, weight: i64) -> AtmEndpoint {
        AtmEndpoint {
            id: None,
            name: Some(name.to_string()),
            endpoint_type: Some(
                "Microsoft.Network/trafficManagerProfiles/azureEndpoints".to_string(),
            ),
            properties: Some(AtmEndpointProperties {
                target_resource_id: Some(target.to_string()),
                target: None,
                endpoint_status: Some("Enabled".to_string()),
                weight: Some(weight),
            }),
        }
    }

    fn profile_with(endpoints: Vec<AtmEndpoint>) -> AtmProfile {
        AtmProfile {
            name: Some(PROFILE.to_string()),
            properties: Some(AtmProfileProperties {
                endpoints: Some(endpoints),
                ..AtmProfileProperties::default()
            }),
            ..AtmProfile::default()
        }
    }

    fn wanted(cluster: &str, target: &str, weight: i64) -> DesiredEndpoint {
        DesiredEndpoint {
            name: endpoint_name(BACKEND_UID, "store", cluster),
            target_resource_id: target.to_string(),
            weight,
            from_cluster: cluster.to_string(),
            from_weight: 1,
        }
    }

    fn desired_map(entries: Vec<DesiredEndpoint>) -> BTreeMap<String, DesiredEndpoint> {
        entries
            .into_iter()
            .map(|d| (d.name.to_lowercase(), d))
            .collect()
    }

    fn prefix() -> String {
        endpoint_prefix(BACKEND_UID)
    }

    // =====================================================
    // Reconcile
    // =====================================================

    #[tokio::test]
    async fn test_steady_state_performs_no_writes() {
        let fake = FakeTrafficManager::default();
        let want = wanted("member-1", "/pip-1", 10);
        let profile = profile_with(vec![provider_endpoint(&want.name, "/pip-1", 10)]);

        let outcome = reconcile_endpoints(
            &fake,
            RESOURCE_GROUP,
            PROFILE,
            &profile,
            &prefix(),
            desired_map(vec![want.clone()]),
        )
        .await
        .unwrap();

        assert!(fake.ops().is_empty(), "steady state must not write");
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].name, want.name);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_creates_missing_endpoint() {
        let fake = FakeTrafficManager::default();
        let want = wanted("member-1", "/pip-1", 10);
        let profile = profile_with(vec![]);

        let outcome = reconcile_endpoints(
            &fake,
            RESOURCE_GROUP,
            PROFILE,
            &profile,
            &prefix(),
            desired_map(vec![want.clone()]),
        )
        .await
        .unwrap();

        assert_eq!(fake.ops(), vec![("put", want.name.clone())]);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].weight, Some(10));
    }

    #[tokio::test]
    async fn test_deletes_precede_creates() {
        let fake = FakeTrafficManager::default();
        let stale = endpoint_name(BACKEND_UID, "store", "member-gone");
        let want = wanted("member-1", "/pip-1", 10);
        let profile = profile_with(vec![provider_endpoint(&stale, "/pip-old", 3)]);

        reconcile_endpoints(
            &fake,
            RESOURCE_GROUP,
            PROFILE,
            &profile,
            &prefix(),
            desired_map(vec![want.clone()]),
        )
        .await
        .unwrap();

        let ops = fake.ops();
        assert_eq!(ops[0], ("delete", stale));
        assert_eq!(ops[1], ("put", want.name));
    }

    #[tokio::test]
    async fn test_updates_endpoint_with_drifted_weight_in_place() {
        let fake = FakeTrafficManager::default();
        let want = wanted("member-1", "/pip-1", 10);
        // Same name, wrong weight: must be rewritten, not deleted
        let profile = profile_with(vec![provider_endpoint(&want.name, "/pip-1", 3)]);

        let outcome = reconcile_endpoints(
            &fake,
            RESOURCE_GROUP,
            PROFILE,
            &profile,
            &prefix(),
            desired_map(vec![want.clone()]),
        )
        .await
        .unwrap();

        assert_eq!(fake.ops(), vec![("put", want.name)]);
        assert_eq!(outcome.accepted.len(), 1);
    }

    #[tokio::test]
    async fn test_foreign_and_unnamed_endpoints_untouched() {
        let fake = FakeTrafficManager::default();
        let foreign = provider_endpoint("fleet-other-uid#store#member-9", "/pip-9", 1);
        let unnamed = AtmEndpoint {
            name: None,
            ..provider_endpoint("ignored", "/pip", 1)
        };
        let profile = profile_with(vec![foreign, unnamed]);

        let outcome = reconcile_endpoints(
            &fake,
            RESOURCE_GROUP,
            PROFILE,
            &profile,
            &prefix(),
            BTreeMap::new(),
        )
        .await
        .unwrap();

        assert!(fake.ops().is_empty());
        assert!(outcome.accepted.is_empty());
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_partial_client_failure_continues_batch() {
        let want_ok = wanted("member-0", "/pip-0", 5);
        let want_bad = wanted("member-1", "/pip-1", 5);
        let fake = FakeTrafficManager::failing_client(&[want_bad.name.as_str()]);
        let profile = profile_with(vec![]);

        let outcome = reconcile_endpoints(
            &fake,
            RESOURCE_GROUP,
            PROFILE,
            &profile,
            &prefix(),
            desired_map(vec![want_ok.clone(), want_bad.clone()]),
        )
        .await
        .unwrap();

        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].name, want_ok.name);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].contains(&want_bad.name));
    }

    #[tokio::test]
    async fn test_throttled_write_halts_batch() {
        let want = wanted("member-1", "/pip-1", 5);
        let fake = FakeTrafficManager::failing_throttled(&[want.name.as_str()]);
        let profile = profile_with(vec![]);

        let halt = reconcile_endpoints(
            &fake,
            RESOURCE_GROUP,
            PROFILE,
            &profile,
            &prefix(),
            desired_map(vec![want.clone()]),
        )
        .await
        .unwrap_err();

        assert_eq!(halt.endpoint, want.name);
        assert!(halt.source.is_retryable());
    }

    #[tokio::test]
    async fn test_retryable_delete_failure_halts_batch() {
        let stale = endpoint_name(BACKEND_UID, "store", "member-gone");
        let fake = FakeTrafficManager::failing_throttled(&[stale.as_str()]);
        let profile = profile_with(vec![provider_endpoint(&stale, "/pip-old", 3)]);

        let halt = reconcile_endpoints(
            &fake,
            RESOURCE_GROUP,
            PROFILE,
            &profile,
            &prefix(),
            BTreeMap::new(),
        )
        .await
        .unwrap_err();

        assert_eq!(halt.endpoint, stale);
    }

    // =====================================================
    // Cleanup
    // =====================================================

    #[tokio::test]
    async fn test_cleanup_deletes_only_owned_endpoints() {
        let fake = FakeTrafficManager::default();
        let owned_1 = endpoint_name(BACKEND_UID, "store", "member-0");
        let owned_2 = endpoint_name(BACKEND_UID, "store", "member-1");
        let profile = profile_with(vec![
            provider_endpoint(&owned_1, "/pip-0", 5),
            provider_endpoint(&owned_2, "/pip-1", 5),
            provider_endpoint("fleet-other-uid#store#member-2", "/pip-2", 5),
        ]);

        let deleted = cleanup_endpoints(&fake, RESOURCE_GROUP, PROFILE, &profile, &prefix())
            .await
            .unwrap();

        assert_eq!(deleted, 2);
        let mut deleted_names: Vec<String> =
            fake.ops().into_iter().map(|(_, name)| name).collect();
        deleted_names.sort();
        assert_eq!(deleted_names, vec![owned_1, owned_2]);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent_on_empty_profile() {
        let fake = FakeTrafficManager::default();
        let profile = profile_with(vec![]);

        let first = cleanup_endpoints(&fake, RESOURCE_GROUP, PROFILE, &profile, &prefix())
            .await
            .unwrap();
        let second = cleanup_endpoints(&fake, RESOURCE_GROUP, PROFILE, &profile, &prefix())
            .await
            .unwrap();

        assert_eq!(first, 0);
        assert_eq!(second, 0);
        assert!(fake.ops().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_surfaces_first_hard_failure() {
        let owned = endpoint_name(BACKEND_UID, "store", "member-0");
        let fake = FakeTrafficManager::failing_throttled(&[owned.as_str()]);
        let profile = profile_with(vec![provider_endpoint(&owned, "/pip-0", 5)]);

        let err = cleanup_endpoints(&fake, RESOURCE_GROUP, PROFILE, &profile, &prefix())
            .await
            .unwrap_err();

        assert!(err.is_retryable());
    }
}
