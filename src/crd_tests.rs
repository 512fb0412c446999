// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `crd.rs`

#[cfg(test)]
mod tests {
    use crate::crd::*;
    use crate::status_reasons::{CONDITION_ACCEPTED, CONDITION_PROGRAMMED};
    use kube::api::ObjectMeta;
    use kube::CustomResourceExt;

    fn condition(r#type: &str, status: &str, observed_generation: Option<i64>) -> Condition {
        Condition {
            r#type: r#type.to_string(),
            status: status.to_string(),
            reason: None,
            message: None,
            last_transition_time: None,
            observed_generation,
        }
    }

    // =====================================================
    // CRD generation
    // =====================================================

    #[test]
    fn test_backend_crd_identity() {
        let crd = TrafficManagerBackend::crd();
        assert_eq!(crd.spec.group, "fleetdns.firestoned.io");
        assert_eq!(crd.spec.names.kind, "TrafficManagerBackend");
        assert_eq!(crd.spec.scope, "Namespaced");

        let version = &crd.spec.versions[0];
        assert_eq!(version.name, "v1alpha1");
        assert!(
            version.subresources.as_ref().is_some_and(|s| s.status.is_some()),
            "status subresource must be enabled"
        );
    }

    #[test]
    fn test_all_crds_share_group_and_scope() {
        for crd in [
            TrafficManagerProfile::crd(),
            TrafficManagerBackend::crd(),
            ServiceImport::crd(),
            InternalServiceExport::crd(),
        ] {
            assert_eq!(crd.spec.group, "fleetdns.firestoned.io");
            assert_eq!(crd.spec.scope, "Namespaced");
        }
    }

    // =====================================================
    // Wire format
    // =====================================================

    #[test]
    fn test_export_spec_serde_field_names() {
        let spec = InternalServiceExportSpec {
            r#type: "LoadBalancer".to_string(),
            is_internal_load_balancer: false,
            is_dns_label_configured: true,
            public_ip_resource_id: Some("/pip".to_string()),
            weight: Some(2),
            service_reference: ServiceReference {
                namespace: "team-a".to_string(),
                name: "store".to_string(),
                cluster_id: "member-1".to_string(),
                namespaced_name: "team-a/store".to_string(),
            },
        };

        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["type"], "LoadBalancer");
        assert_eq!(json["isDNSLabelConfigured"], true);
        assert_eq!(json["publicIPResourceID"], "/pip");
        assert_eq!(json["serviceReference"]["clusterID"], "member-1");
        assert_eq!(json["serviceReference"]["namespacedName"], "team-a/store");
    }

    #[test]
    fn test_backend_spec_serde_round_trip() {
        let raw = serde_json::json!({
            "profile": {"name": "team-a-profile"},
            "backend": {"name": "store"},
            "weight": 100
        });

        let spec: TrafficManagerBackendSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(spec.profile.name, "team-a-profile");
        assert_eq!(spec.backend.name, "store");
        assert_eq!(spec.weight, Some(100));
    }

    #[test]
    fn test_backend_weight_is_optional_in_wire_format() {
        let raw = serde_json::json!({
            "profile": {"name": "p"},
            "backend": {"name": "b"}
        });

        let spec: TrafficManagerBackendSpec = serde_json::from_value(raw).unwrap();
        assert_eq!(spec.weight, None);
    }

    // =====================================================
    // Defaulting and helpers
    // =====================================================

    fn backend_with_weight(weight: Option<i64>) -> TrafficManagerBackend {
        TrafficManagerBackend {
            metadata: ObjectMeta::default(),
            spec: TrafficManagerBackendSpec {
                profile: ProfileReference { name: "p".to_string() },
                backend: BackendReference { name: "b".to_string() },
                weight,
            },
            status: None,
        }
    }

    #[test]
    fn test_backend_weight_defaults_to_one() {
        assert_eq!(backend_with_weight(None).effective_weight(), 1);
        assert_eq!(backend_with_weight(Some(0)).effective_weight(), 0);
        assert_eq!(backend_with_weight(Some(500)).effective_weight(), 500);
    }

    #[test]
    fn test_export_weight_defaults_to_one() {
        let export = InternalServiceExport {
            metadata: ObjectMeta::default(),
            spec: InternalServiceExportSpec {
                r#type: "LoadBalancer".to_string(),
                is_internal_load_balancer: false,
                is_dns_label_configured: true,
                public_ip_resource_id: None,
                weight: None,
                service_reference: ServiceReference::default(),
            },
            status: None,
        };
        assert_eq!(export.effective_weight(), 1);
    }

    #[test]
    fn test_atm_profile_name_is_uid_derived() {
        let profile = TrafficManagerProfile {
            metadata: ObjectMeta {
                name: Some("team-a-profile".to_string()),
                uid: Some("abc-123".to_string()),
                ..Default::default()
            },
            spec: TrafficManagerProfileSpec {
                resource_group: "fleet-rg".to_string(),
            },
            status: None,
        };
        assert_eq!(profile.atm_profile_name().as_deref(), Some("fleet-abc-123"));

        let no_uid = TrafficManagerProfile {
            metadata: ObjectMeta::default(),
            spec: TrafficManagerProfileSpec {
                resource_group: "fleet-rg".to_string(),
            },
            status: None,
        };
        assert_eq!(no_uid.atm_profile_name(), None);
    }

    #[test]
    fn test_programmed_condition_lookup() {
        let profile = TrafficManagerProfile {
            metadata: ObjectMeta::default(),
            spec: TrafficManagerProfileSpec {
                resource_group: "fleet-rg".to_string(),
            },
            status: Some(TrafficManagerProfileStatus {
                conditions: vec![
                    condition("SomethingElse", "True", None),
                    condition(CONDITION_PROGRAMMED, "True", Some(2)),
                ],
            }),
        };

        let programmed = profile.programmed_condition().unwrap();
        assert_eq!(programmed.status, "True");
        assert_eq!(programmed.observed_generation, Some(2));
    }

    #[test]
    fn test_accepted_condition_lookup_absent_without_status() {
        assert!(backend_with_weight(None).accepted_condition().is_none());

        let mut backend = backend_with_weight(None);
        backend.status = Some(TrafficManagerBackendStatus {
            conditions: vec![condition(CONDITION_ACCEPTED, "False", Some(1))],
            endpoints: vec![],
        });
        assert_eq!(backend.accepted_condition().unwrap().status, "False");
    }

    #[test]
    fn test_endpoint_status_wire_format() {
        let endpoint = TrafficManagerEndpointStatus {
            name: "fleet-uid#store#member-1".to_string(),
            target: Some("/pip".to_string()),
            weight: Some(7),
            from: Some(EndpointSource {
                cluster: "member-1".to_string(),
                weight: Some(2),
            }),
        };

        let json = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(json["name"], "fleet-uid#store#member-1");
        assert_eq!(json["target"], "/pip");
        assert_eq!(json["weight"], 7);
        assert_eq!(json["from"]["cluster"], "member-1");
        assert_eq!(json["from"]["weight"], 2);
    }
}
