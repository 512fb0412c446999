// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Azure Active Directory token acquisition for ARM requests.
//!
//! Tokens are obtained with the OAuth2 client-credentials grant and cached
//! until shortly before expiry. A static bearer token can be injected through
//! `FLEETDNS_AZURE_BEARER_TOKEN` for development and tests, bypassing AAD
//! entirely.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::azure::errors::TrafficManagerError;

/// Default AAD authority endpoint
const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Scope requested for ARM access
const ARM_SCOPE: &str = "https://management.azure.com/.default";

/// Refresh tokens this long before they actually expire
const EXPIRY_SKEW_SECS: i64 = 120;

/// Service principal credentials read from the environment.
#[derive(Clone, Debug)]
pub struct AzureCredentials {
    /// AAD tenant ID
    pub tenant_id: String,
    /// Application (client) ID
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
    /// Authority endpoint, overridable for sovereign clouds and tests
    pub authority: String,
}

impl AzureCredentials {
    /// Load credentials from `FLEETDNS_AZURE_TENANT_ID`,
    /// `FLEETDNS_AZURE_CLIENT_ID`, and `FLEETDNS_AZURE_CLIENT_SECRET`.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the three required variables is missing.
    pub fn from_env() -> Result<Self, TrafficManagerError> {
        let var = |name: &str| {
            std::env::var(name)
                .map_err(|_| TrafficManagerError::Auth(format!("{name} is not set")))
        };

        Ok(Self {
            tenant_id: var("FLEETDNS_AZURE_TENANT_ID")?,
            client_id: var("FLEETDNS_AZURE_CLIENT_ID")?,
            client_secret: var("FLEETDNS_AZURE_CLIENT_SECRET")?,
            authority: std::env::var("FLEETDNS_AZURE_AUTHORITY")
                .unwrap_or_else(|_| DEFAULT_AUTHORITY.to_string()),
        })
    }
}

#[derive(Clone, Debug)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Expiry-aware source of ARM bearer tokens.
///
/// Cheap to share behind an `Arc`; concurrent reconciles reuse the cached
/// token and only one refresh runs at a time thanks to the write lock.
pub struct TokenSource {
    credentials: Option<AzureCredentials>,
    static_token: Option<String>,
    http: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenSource {
    /// Create a token source from explicit credentials.
    #[must_use]
    pub fn new(credentials: AzureCredentials, http: reqwest::Client) -> Self {
        Self {
            credentials: Some(credentials),
            static_token: None,
            http,
            cached: RwLock::new(None),
        }
    }

    /// Create a token source that always returns the given token.
    ///
    /// Used when `FLEETDNS_AZURE_BEARER_TOKEN` is set and by tests.
    #[must_use]
    pub fn with_static_token(token: impl Into<String>) -> Self {
        Self {
            credentials: None,
            static_token: Some(token.into()),
            http: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// Build a token source from the environment: a static token when
    /// `FLEETDNS_AZURE_BEARER_TOKEN` is set, otherwise service principal
    /// credentials.
    ///
    /// # Errors
    ///
    /// Returns an error if neither a static token nor a full set of
    /// credentials is available.
    pub fn from_env(http: reqwest::Client) -> Result<Self, TrafficManagerError> {
        if let Ok(token) = std::env::var("FLEETDNS_AZURE_BEARER_TOKEN") {
            debug!("Using static bearer token from FLEETDNS_AZURE_BEARER_TOKEN");
            return Ok(Self::with_static_token(token));
        }
        Ok(Self::new(AzureCredentials::from_env()?, http))
    }

    /// Return a bearer token valid for at least [`EXPIRY_SKEW_SECS`] seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TrafficManagerError::Auth`] if the token endpoint rejects
    /// the credentials, or [`TrafficManagerError::Network`] if it is
    /// unreachable.
    pub async fn token(&self) -> Result<String, TrafficManagerError> {
        if let Some(token) = &self.static_token {
            return Ok(token.clone());
        }

        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let mut slot = self.cached.write().await;
        // Another task may have refreshed while we waited for the lock
        if let Some(cached) = slot.as_ref() {
            if cached.expires_at > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *slot = Some(token);
        Ok(access_token)
    }

    async fn fetch_token(&self) -> Result<CachedToken, TrafficManagerError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| TrafficManagerError::Auth("no Azure credentials configured".into()))?;

        let url = format!("{}/{}/oauth2/v2.0/token", creds.authority, creds.tenant_id);
        debug!(tenant = %creds.tenant_id, "Requesting ARM access token");

        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("scope", ARM_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| TrafficManagerError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrafficManagerError::Auth(format!(
                "token endpoint returned HTTP {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| TrafficManagerError::Auth(format!("malformed token response: {e}")))?;

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in - EXPIRY_SKEW_SECS),
        })
    }
}
