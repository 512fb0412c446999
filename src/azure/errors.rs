// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for Azure Traffic Manager operations.
//!
//! The reconciler cares about three classes of provider failure and this
//! module encodes them directly:
//!
//! - **Not found** (404): a missing profile is a precondition failure; a
//!   missing endpoint on delete is success.
//! - **Client errors** (4xx except 429): the request itself is bad; retrying
//!   the same write cannot help, but other endpoints in the batch can still
//!   proceed.
//! - **Retryable errors** (429, 5xx, network, auth): the batch stops and the
//!   reconcile is retried with backoff.

use thiserror::Error;

/// Errors returned by the Azure Traffic Manager client.
#[derive(Error, Debug, Clone)]
pub enum TrafficManagerError {
    /// The Traffic Manager profile does not exist in the resource group (HTTP 404).
    #[error("Traffic Manager profile '{profile}' not found in resource group '{resource_group}'")]
    ProfileNotFound {
        /// External profile name
        profile: String,
        /// Azure resource group that was queried
        resource_group: String,
    },

    /// The endpoint does not exist beneath the profile (HTTP 404).
    ///
    /// Delete paths treat this as success.
    #[error("endpoint '{endpoint}' not found in Traffic Manager profile '{profile}'")]
    EndpointNotFound {
        /// Endpoint name
        endpoint: String,
        /// External profile name
        profile: String,
    },

    /// The request was rejected by Azure (4xx other than 429).
    ///
    /// Typically a malformed endpoint, a quota violation, or missing
    /// permissions on the target resource. Retrying the identical request
    /// cannot succeed.
    #[error("Azure rejected the request (HTTP {status}): {message}")]
    Client {
        /// HTTP status code (400-499, excluding 429)
        status: u16,
        /// Response body or error message from Azure
        message: String,
    },

    /// Azure throttled the request (HTTP 429).
    #[error("Azure throttled the request (HTTP 429), retry after {retry_after_secs:?} second(s)")]
    Throttled {
        /// Value of the Retry-After header, when present
        retry_after_secs: Option<u64>,
    },

    /// Azure returned a server-side error (5xx).
    #[error("Azure server error (HTTP {status}): {message}")]
    Server {
        /// HTTP status code (500-599)
        status: u16,
        /// Response body or error message from Azure
        message: String,
    },

    /// The request never reached Azure (connect failure, timeout, TLS).
    #[error("network error reaching Azure: {0}")]
    Network(String),

    /// Token acquisition or refresh failed.
    #[error("Azure authentication failed: {0}")]
    Auth(String),
}

impl TrafficManagerError {
    /// True for 404-class results on either resource.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ProfileNotFound { .. } | Self::EndpointNotFound { .. }
        )
    }

    /// True for non-throttled client errors: the write is bad, the batch may
    /// continue with other endpoints.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Client { .. })
    }

    /// True when the operation should be retried with backoff: throttling,
    /// server errors, network failures, and expired credentials.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Throttled { .. } | Self::Server { .. } | Self::Network(_) | Self::Auth(_)
        )
    }

    /// The Kubernetes status condition reason this error maps to.
    #[must_use]
    pub fn status_reason(&self) -> &'static str {
        if self.is_retryable() {
            crate::status_reasons::REASON_PENDING
        } else {
            crate::status_reasons::REASON_INVALID
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        let err = TrafficManagerError::ProfileNotFound {
            profile: "fleet-abc".into(),
            resource_group: "rg".into(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_client_error());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_client_error_classification() {
        let err = TrafficManagerError::Client {
            status: 400,
            message: "bad target".into(),
        };
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        assert!(!err.is_not_found());
        assert_eq!(err.status_reason(), crate::status_reasons::REASON_INVALID);
    }

    #[test]
    fn test_retryable_classification() {
        let throttled = TrafficManagerError::Throttled {
            retry_after_secs: Some(5),
        };
        let server = TrafficManagerError::Server {
            status: 503,
            message: "unavailable".into(),
        };
        let network = TrafficManagerError::Network("connection refused".into());

        for err in [throttled, server, network] {
            assert!(err.is_retryable(), "{err} should be retryable");
            assert!(!err.is_client_error());
            assert_eq!(err.status_reason(), crate::status_reasons::REASON_PENDING);
        }
    }
}
