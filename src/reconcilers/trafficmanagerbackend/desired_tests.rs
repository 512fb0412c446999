// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `desired.rs`

#[cfg(test)]
mod tests {
    use crate::azure::{AtmEndpoint, AtmEndpointProperties};
    use crate::crd::{
        InternalServiceExport, InternalServiceExportSpec, ServiceReference,
    };
    use crate::reconcilers::trafficmanagerbackend::desired::{
        build_desired_endpoints, endpoint_name, endpoint_prefix, is_owned_endpoint,
        normalize_endpoint_type, DesiredEndpoint,
    };
    use std::sync::Arc;

    const BACKEND_UID: &str = "8d7f1a2b-3c4d-5e6f-7a8b-9c0d1e2f3a4b";

    fn export(cluster: &str, weight: Option<i64>, public_ip: &str) -> Arc<InternalServiceExport> {
        Arc::new(InternalServiceExport {
            metadata: kube::api::ObjectMeta {
                name: Some(format!("store-{cluster}")),
                namespace: Some(format!("member-{cluster}")),
                ..Default::default()
            },
            spec: InternalServiceExportSpec {
                r#type: "LoadBalancer".to_string(),
                is_internal_load_balancer: false,
                is_dns_label_configured: true,
                public_ip_resource_id: Some(public_ip.to_string()),
                weight,
                service_reference: ServiceReference {
                    namespace: "team-a".to_string(),
                    name: "store".to_string(),
                    cluster_id: cluster.to_string(),
                    namespaced_name: "team-a/store".to_string(),
                },
            },
            status: None,
        })
    }

    fn existing_endpoint(name: &str, target: &str, weight: i64, status: &str) -> AtmEndpoint {
        AtmEndpoint {
            id: None,
            name: Some(name.to_string()),
            endpoint_type: Some(
                "Microsoft.Network/trafficManagerProfiles/azureEndpoints".to_string(),
            ),
            properties: Some(AtmEndpointProperties {
                target_resource_id: Some(target.to_string()),
                target: None,
                endpoint_status: Some(status.to_string()),
                weight: Some(weight),
            }),
        }
    }

    // =====================================================
    // Naming and ownership
    // =====================================================

    #[test]
    fn test_endpoint_prefix_format() {
        assert_eq!(
            endpoint_prefix(BACKEND_UID),
            format!("fleet-{BACKEND_UID}#")
        );
    }

    #[test]
    fn test_endpoint_name_format() {
        assert_eq!(
            endpoint_name(BACKEND_UID, "store", "member-1"),
            format!("fleet-{BACKEND_UID}#store#member-1")
        );
    }

    #[test]
    fn test_ownership_is_case_insensitive() {
        let prefix = endpoint_prefix(BACKEND_UID);
        let name = endpoint_name(BACKEND_UID, "store", "member-1").to_uppercase();
        assert!(is_owned_endpoint(&name, &prefix));
    }

    #[test]
    fn test_foreign_prefix_is_not_owned() {
        let prefix = endpoint_prefix(BACKEND_UID);
        assert!(!is_owned_endpoint(
            "fleet-other-uid#store#member-1",
            &prefix
        ));
        assert!(!is_owned_endpoint("manually-created", &prefix));
    }

    #[test]
    fn test_ownership_determinism_across_backends() {
        // Any endpoint name is owned by at most one backend
        let prefix_a = endpoint_prefix("uid-a");
        let prefix_b = endpoint_prefix("uid-b");
        let name = endpoint_name("uid-a", "store", "member-1");
        assert!(is_owned_endpoint(&name, &prefix_a));
        assert!(!is_owned_endpoint(&name, &prefix_b));
    }

    #[test]
    fn test_normalize_endpoint_type_forms() {
        assert_eq!(normalize_endpoint_type("AzureEndpoints"), "azureendpoints");
        assert_eq!(
            normalize_endpoint_type("Microsoft.Network/trafficManagerProfiles/azureEndpoints"),
            "azureendpoints"
        );
    }

    // =====================================================
    // Weight apportionment (proportional rule)
    // =====================================================

    #[test]
    fn test_single_cluster_gets_total_weight() {
        let exports = vec![export("member-1", Some(1), "/pip-1")];
        let desired = build_desired_endpoints(BACKEND_UID, "store", 10, &exports);

        assert_eq!(desired.len(), 1);
        let endpoint = desired.values().next().unwrap();
        assert_eq!(endpoint.weight, 10);
        assert_eq!(endpoint.target_resource_id, "/pip-1");
    }

    #[test]
    fn test_equal_weights_split_with_ceiling() {
        let exports = vec![
            export("member-1", Some(1), "/pip-1"),
            export("member-2", Some(1), "/pip-2"),
        ];
        let desired = build_desired_endpoints(BACKEND_UID, "store", 10, &exports);

        assert_eq!(desired.len(), 2);
        for endpoint in desired.values() {
            assert_eq!(endpoint.weight, 5);
        }
    }

    #[test]
    fn test_proportional_split_two_to_one() {
        // Total 10 split 2:1 -> ceil(20/3)=7 and ceil(10/3)=4
        let exports = vec![
            export("member-1", Some(2), "/pip-1"),
            export("member-2", Some(1), "/pip-2"),
        ];
        let desired = build_desired_endpoints(BACKEND_UID, "store", 10, &exports);

        let key_1 = endpoint_name(BACKEND_UID, "store", "member-1").to_lowercase();
        let key_2 = endpoint_name(BACKEND_UID, "store", "member-2").to_lowercase();
        assert_eq!(desired[&key_1].weight, 7);
        assert_eq!(desired[&key_2].weight, 4);
    }

    #[test]
    fn test_weight_conservation_over_full_range() {
        // For every total in [1,1000] and cluster counts up to 8, each
        // allocation is a positive integer equal to the ceiled share
        for total in 1..=1000_i64 {
            for n in [1_usize, 2, 3, 5, 8] {
                let exports: Vec<_> = (0..n)
                    .map(|i| export(&format!("member-{i}"), Some(1), "/pip"))
                    .collect();
                let desired = build_desired_endpoints(BACKEND_UID, "store", total, &exports);

                assert_eq!(desired.len(), n);
                let expected = (total + n as i64 - 1) / n as i64;
                for endpoint in desired.values() {
                    assert_eq!(endpoint.weight, expected);
                    assert!(endpoint.weight >= 1);
                }
            }
        }
    }

    #[test]
    fn test_zero_weight_export_gets_no_endpoint() {
        let exports = vec![
            export("member-1", Some(0), "/pip-1"),
            export("member-2", Some(1), "/pip-2"),
        ];
        let desired = build_desired_endpoints(BACKEND_UID, "store", 10, &exports);

        assert_eq!(desired.len(), 1);
        let endpoint = desired.values().next().unwrap();
        assert_eq!(endpoint.from_cluster, "member-2");
        assert_eq!(endpoint.weight, 10);
    }

    #[test]
    fn test_all_zero_weights_yield_empty_map() {
        let exports = vec![
            export("member-1", Some(0), "/pip-1"),
            export("member-2", Some(0), "/pip-2"),
        ];
        let desired = build_desired_endpoints(BACKEND_UID, "store", 10, &exports);
        assert!(desired.is_empty());
    }

    #[test]
    fn test_export_weight_defaults_to_one() {
        let exports = vec![
            export("member-1", None, "/pip-1"),
            export("member-2", None, "/pip-2"),
        ];
        let desired = build_desired_endpoints(BACKEND_UID, "store", 10, &exports);

        for endpoint in desired.values() {
            assert_eq!(endpoint.from_weight, 1);
            assert_eq!(endpoint.weight, 5);
        }
    }

    #[test]
    fn test_desired_map_keys_are_lowercased_names() {
        let exports = vec![export("Member-1", Some(1), "/pip-1")];
        let desired = build_desired_endpoints(BACKEND_UID, "store", 10, &exports);

        let key = desired.keys().next().unwrap();
        assert_eq!(key, &key.to_lowercase());
    }

    // =====================================================
    // Semantic equality against provider endpoints
    // =====================================================

    fn sample_desired() -> DesiredEndpoint {
        DesiredEndpoint {
            name: endpoint_name(BACKEND_UID, "store", "member-1"),
            target_resource_id: "/subscriptions/s/publicIPAddresses/pip-1".to_string(),
            weight: 10,
            from_cluster: "member-1".to_string(),
            from_weight: 1,
        }
    }

    #[test]
    fn test_matches_accepts_long_type_and_case_differences() {
        let wanted = sample_desired();
        let existing = existing_endpoint(
            &wanted.name,
            "/SUBSCRIPTIONS/S/PUBLICIPADDRESSES/PIP-1",
            10,
            "enabled",
        );
        assert!(wanted.matches(&existing));
    }

    #[test]
    fn test_matches_rejects_weight_drift() {
        let wanted = sample_desired();
        let existing = existing_endpoint(&wanted.name, &wanted.target_resource_id, 3, "Enabled");
        assert!(!wanted.matches(&existing));
    }

    #[test]
    fn test_matches_rejects_disabled_endpoint() {
        let wanted = sample_desired();
        let existing =
            existing_endpoint(&wanted.name, &wanted.target_resource_id, 10, "Disabled");
        assert!(!wanted.matches(&existing));
    }

    #[test]
    fn test_matches_rejects_missing_fields() {
        let wanted = sample_desired();
        let mut existing =
            existing_endpoint(&wanted.name, &wanted.target_resource_id, 10, "Enabled");
        existing.properties.as_mut().unwrap().weight = None;
        assert!(!wanted.matches(&existing));

        let bare = AtmEndpoint {
            name: Some(wanted.name.clone()),
            ..AtmEndpoint::default()
        };
        assert!(!wanted.matches(&bare));
    }

    // =====================================================
    // Wire and status conversion
    // =====================================================

    #[test]
    fn test_to_atm_endpoint_uses_short_type_and_enabled() {
        let wanted = sample_desired();
        let wire = wanted.to_atm_endpoint();

        assert_eq!(wire.endpoint_type.as_deref(), Some("AzureEndpoints"));
        let properties = wire.properties.unwrap();
        assert_eq!(properties.endpoint_status.as_deref(), Some("Enabled"));
        assert_eq!(properties.weight, Some(10));
        assert_eq!(
            properties.target_resource_id.as_deref(),
            Some(wanted.target_resource_id.as_str())
        );
    }

    #[test]
    fn test_to_status_reports_source_cluster_and_weight() {
        let wanted = sample_desired();
        let status = wanted.to_status();

        assert_eq!(status.name, wanted.name);
        assert_eq!(status.target.as_deref(), Some(wanted.target_resource_id.as_str()));
        assert_eq!(status.weight, Some(10));
        let from = status.from.unwrap();
        assert_eq!(from.cluster, "member-1");
        assert_eq!(from.weight, Some(1));
    }
}
