// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Azure Traffic Manager client.
//!
//! Speaks the ARM REST shape for Traffic Manager profiles and endpoints over
//! plain HTTPS. The reconcilers depend on the [`TrafficManager`] trait rather
//! than the concrete client so tests can substitute an in-memory fake.
//!
//! Only three operations exist, mirroring what the reconciler needs:
//!
//! - `GET`    `.../trafficmanagerprofiles/{profile}` (endpoints embedded)
//! - `PUT`    `.../trafficmanagerprofiles/{profile}/{type}/{endpoint}`
//! - `DELETE` `.../trafficmanagerprofiles/{profile}/{type}/{endpoint}`

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::azure::auth::TokenSource;
use crate::azure::errors::TrafficManagerError;
use crate::constants::{ATM_API_VERSION, ATM_DEFAULT_BASE_URL};

// ============================================================================
// Wire types
// ============================================================================

/// DNS configuration block of a Traffic Manager profile.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AtmDnsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fqdn: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

/// Mutable properties of a Traffic Manager endpoint.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AtmEndpointProperties {
    /// Azure resource ID the endpoint routes to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_resource_id: Option<String>,

    /// FQDN target, populated by Azure on reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,

    /// `Enabled` or `Disabled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_status: Option<String>,

    /// Routing weight, 1..=1000 at the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
}

/// A single endpoint beneath a Traffic Manager profile.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AtmEndpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub endpoint_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<AtmEndpointProperties>,
}

/// Properties of a Traffic Manager profile, endpoints embedded.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AtmProfileProperties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_status: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub traffic_routing_method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_config: Option<AtmDnsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<Vec<AtmEndpoint>>,
}

/// A Traffic Manager profile as returned by ARM.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AtmProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<AtmProfileProperties>,
}

impl AtmProfile {
    /// The embedded endpoint list, empty when Azure omits the field.
    #[must_use]
    pub fn endpoints(&self) -> &[AtmEndpoint] {
        self.properties
            .as_ref()
            .and_then(|p| p.endpoints.as_deref())
            .unwrap_or_default()
    }
}

// ============================================================================
// Trait
// ============================================================================

/// The slice of Azure Traffic Manager the reconcilers consume.
///
/// Endpoint deletes treat a missing endpoint as success; everything else
/// surfaces through [`TrafficManagerError`].
#[async_trait]
pub trait TrafficManager: Send + Sync {
    /// Fetch a profile, including its embedded endpoint list.
    async fn get_profile(
        &self,
        resource_group: &str,
        profile_name: &str,
    ) -> Result<AtmProfile, TrafficManagerError>;

    /// Create or update a single endpoint beneath a profile.
    async fn create_or_update_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: &str,
        endpoint_name: &str,
        endpoint: &AtmEndpoint,
    ) -> Result<AtmEndpoint, TrafficManagerError>;

    /// Delete a single endpoint. A 404 from Azure is success.
    async fn delete_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: &str,
        endpoint_name: &str,
    ) -> Result<(), TrafficManagerError>;
}

// ============================================================================
// ARM REST client
// ============================================================================

/// Production [`TrafficManager`] implementation over the ARM REST API.
pub struct AzureTrafficManagerClient {
    http: reqwest::Client,
    base_url: String,
    subscription_id: String,
    tokens: Arc<TokenSource>,
}

impl AzureTrafficManagerClient {
    /// Create a client for the given subscription.
    #[must_use]
    pub fn new(http: reqwest::Client, subscription_id: String, tokens: Arc<TokenSource>) -> Self {
        Self {
            http,
            base_url: ATM_DEFAULT_BASE_URL.to_string(),
            subscription_id,
            tokens,
        }
    }

    /// Override the ARM endpoint (sovereign clouds, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn profile_url(&self, resource_group: &str, profile_name: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/trafficmanagerprofiles/{}?api-version={}",
            self.base_url, self.subscription_id, resource_group, profile_name, ATM_API_VERSION
        )
    }

    fn endpoint_url(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: &str,
        endpoint_name: &str,
    ) -> String {
        // Endpoint names embed '#', which a URL parser reads as a fragment
        // delimiter; it must travel percent-encoded
        let endpoint_segment = endpoint_name.replace('#', "%23");
        format!(
            "{}/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/trafficmanagerprofiles/{}/{}/{}?api-version={}",
            self.base_url,
            self.subscription_id,
            resource_group,
            profile_name,
            endpoint_type,
            endpoint_segment,
            ATM_API_VERSION
        )
    }

    async fn bearer(&self) -> Result<String, TrafficManagerError> {
        self.tokens.token().await
    }

    /// Classify a non-2xx ARM response.
    ///
    /// 404 handling differs per call site (profile vs endpoint, get vs
    /// delete), so the caller maps it; this helper covers 429/4xx/5xx.
    async fn classify_failure(response: reqwest::Response) -> TrafficManagerError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let message = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            TrafficManagerError::Throttled {
                retry_after_secs: retry_after,
            }
        } else if status.is_client_error() {
            TrafficManagerError::Client {
                status: status.as_u16(),
                message,
            }
        } else {
            TrafficManagerError::Server {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl TrafficManager for AzureTrafficManagerClient {
    async fn get_profile(
        &self,
        resource_group: &str,
        profile_name: &str,
    ) -> Result<AtmProfile, TrafficManagerError> {
        let url = self.profile_url(resource_group, profile_name);
        debug!(profile = profile_name, resource_group, "Fetching Traffic Manager profile");

        let response = self
            .http
            .get(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| TrafficManagerError::Network(e.to_string()))?;

        match response.status().as_u16() {
            200 => response
                .json::<AtmProfile>()
                .await
                .map_err(|e| TrafficManagerError::Network(format!("malformed profile body: {e}"))),
            404 => Err(TrafficManagerError::ProfileNotFound {
                profile: profile_name.to_string(),
                resource_group: resource_group.to_string(),
            }),
            _ => Err(Self::classify_failure(response).await),
        }
    }

    async fn create_or_update_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: &str,
        endpoint_name: &str,
        endpoint: &AtmEndpoint,
    ) -> Result<AtmEndpoint, TrafficManagerError> {
        let url = self.endpoint_url(resource_group, profile_name, endpoint_type, endpoint_name);
        debug!(
            endpoint = endpoint_name,
            profile = profile_name,
            "Creating or updating Traffic Manager endpoint"
        );

        let response = self
            .http
            .put(&url)
            .bearer_auth(self.bearer().await?)
            .json(endpoint)
            .send()
            .await
            .map_err(|e| TrafficManagerError::Network(e.to_string()))?;

        match response.status().as_u16() {
            200 | 201 => response
                .json::<AtmEndpoint>()
                .await
                .map_err(|e| TrafficManagerError::Network(format!("malformed endpoint body: {e}"))),
            404 => Err(TrafficManagerError::ProfileNotFound {
                profile: profile_name.to_string(),
                resource_group: resource_group.to_string(),
            }),
            _ => Err(Self::classify_failure(response).await),
        }
    }

    async fn delete_endpoint(
        &self,
        resource_group: &str,
        profile_name: &str,
        endpoint_type: &str,
        endpoint_name: &str,
    ) -> Result<(), TrafficManagerError> {
        let url = self.endpoint_url(resource_group, profile_name, endpoint_type, endpoint_name);
        debug!(
            endpoint = endpoint_name,
            profile = profile_name,
            "Deleting Traffic Manager endpoint"
        );

        let response = self
            .http
            .delete(&url)
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| TrafficManagerError::Network(e.to_string()))?;

        match response.status().as_u16() {
            // 404: the endpoint is already gone, which is the goal
            200 | 202 | 204 | 404 => Ok(()),
            _ => Err(Self::classify_failure(response).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_endpoints_empty_when_absent() {
        let profile = AtmProfile::default();
        assert!(profile.endpoints().is_empty());

        let profile = AtmProfile {
            properties: Some(AtmProfileProperties::default()),
            ..AtmProfile::default()
        };
        assert!(profile.endpoints().is_empty());
    }

    #[test]
    fn test_endpoint_wire_format() {
        let endpoint = AtmEndpoint {
            name: Some("fleet-uid#svc#member-1".into()),
            endpoint_type: Some(crate::constants::ATM_ENDPOINT_TYPE.into()),
            properties: Some(AtmEndpointProperties {
                target_resource_id: Some("/subscriptions/s/publicIPAddresses/pip".into()),
                endpoint_status: Some("Enabled".into()),
                weight: Some(10),
                target: None,
            }),
            id: None,
        };

        let json = serde_json::to_value(&endpoint).unwrap();
        assert_eq!(json["type"], "AzureEndpoints");
        assert_eq!(json["properties"]["targetResourceId"], "/subscriptions/s/publicIPAddresses/pip");
        assert_eq!(json["properties"]["endpointStatus"], "Enabled");
        assert_eq!(json["properties"]["weight"], 10);
    }

    #[test]
    fn test_profile_wire_parse() {
        let body = serde_json::json!({
            "id": "/subscriptions/s/resourceGroups/rg/providers/Microsoft.Network/trafficmanagerprofiles/fleet-p",
            "name": "fleet-p",
            "properties": {
                "profileStatus": "Enabled",
                "trafficRoutingMethod": "Weighted",
                "dnsConfig": {"relativeName": "fleet-p", "fqdn": "fleet-p.trafficmanager.net", "ttl": 60},
                "endpoints": [{
                    "name": "fleet-uid#svc#member-1",
                    "type": "Microsoft.Network/trafficManagerProfiles/azureEndpoints",
                    "properties": {"targetResourceId": "/pip", "endpointStatus": "Enabled", "weight": 5}
                }]
            }
        });

        let profile: AtmProfile = serde_json::from_value(body).unwrap();
        assert_eq!(profile.endpoints().len(), 1);
        let endpoint = &profile.endpoints()[0];
        assert_eq!(endpoint.name.as_deref(), Some("fleet-uid#svc#member-1"));
        assert_eq!(
            endpoint.properties.as_ref().unwrap().weight,
            Some(5)
        );
    }
}
