// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Retry logic with exponential backoff for Kubernetes API calls.
//!
//! This module provides utilities for retrying transient API errors (429,
//! 5xx) with exponential backoff, while failing fast on permanent errors
//! (4xx client errors). Retries are kept short: anything that survives the
//! window propagates to the controller, which sets a Pending condition and
//! requeues with its own backoff.

use anyhow::Result;
use rand::RngExt;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Maximum total time to spend retrying inline (30 seconds)
const MAX_ELAPSED_TIME_SECS: u64 = 30;

/// Initial retry interval (100ms)
const INITIAL_INTERVAL_MILLIS: u64 = 100;

/// Maximum interval between retries (5 seconds)
const MAX_INTERVAL_SECS: u64 = 5;

/// Backoff multiplier (exponential growth factor)
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Randomization factor to prevent thundering herd (±10%)
const RANDOMIZATION_FACTOR: f64 = 0.1;

/// Simple exponential backoff implementation.
///
/// Provides exponential backoff with randomization (jitter) to prevent
/// thundering herd.
pub struct ExponentialBackoff {
    /// Current interval duration
    pub current_interval: Duration,
    /// Maximum interval duration
    pub max_interval: Duration,
    /// Maximum total elapsed time
    pub max_elapsed_time: Option<Duration>,
    /// Backoff multiplier (typically 2.0 for doubling)
    pub multiplier: f64,
    /// Randomization factor (e.g., 0.1 for ±10%)
    pub randomization_factor: f64,
    /// Start time for tracking total elapsed time
    start_time: Instant,
}

impl ExponentialBackoff {
    fn new(
        initial_interval: Duration,
        max_interval: Duration,
        max_elapsed_time: Option<Duration>,
        multiplier: f64,
        randomization_factor: f64,
    ) -> Self {
        Self {
            current_interval: initial_interval,
            max_interval,
            max_elapsed_time,
            multiplier,
            randomization_factor,
            start_time: Instant::now(),
        }
    }

    /// Get the next backoff interval, or None if max elapsed time exceeded.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        if let Some(max_elapsed) = self.max_elapsed_time {
            if self.start_time.elapsed() >= max_elapsed {
                return None;
            }
        }

        let interval = self.current_interval;
        let jittered = self.apply_jitter(interval);

        let next = interval.as_secs_f64() * self.multiplier;
        self.current_interval = Duration::from_secs_f64(next).min(self.max_interval);

        Some(jittered)
    }

    /// Apply randomization (jitter) to an interval.
    fn apply_jitter(&self, interval: Duration) -> Duration {
        if self.randomization_factor == 0.0 {
            return interval;
        }

        let secs = interval.as_secs_f64();
        let delta = secs * self.randomization_factor;
        let min = secs - delta;
        let max = secs + delta;

        let mut rng = rand::rng();
        let jittered = rng.random_range(min..=max);

        Duration::from_secs_f64(jittered.max(0.0))
    }
}

/// Create the default exponential backoff configuration for Kubernetes API
/// retries.
///
/// # Configuration
///
/// - **Initial interval**: 100ms
/// - **Max interval**: 5 seconds
/// - **Max elapsed time**: 30 seconds total
/// - **Multiplier**: 2.0 (exponential growth)
/// - **Randomization**: ±10% (prevents thundering herd)
#[must_use]
pub fn default_backoff() -> ExponentialBackoff {
    ExponentialBackoff::new(
        Duration::from_millis(INITIAL_INTERVAL_MILLIS),
        Duration::from_secs(MAX_INTERVAL_SECS),
        Some(Duration::from_secs(MAX_ELAPSED_TIME_SECS)),
        BACKOFF_MULTIPLIER,
        RANDOMIZATION_FACTOR,
    )
}

/// Retry a Kubernetes API call with exponential backoff.
///
/// Automatically retries on transient errors (HTTP 429, 5xx, network) and
/// fails immediately on permanent errors (4xx client errors except 429).
///
/// # Arguments
///
/// * `operation` - Async function that performs the API call
/// * `operation_name` - Human-readable name for logging (e.g., "get profile")
///
/// # Errors
///
/// Returns an error if:
/// - A non-retryable error is encountered (4xx client error)
/// - The retry window is exhausted
///
/// # Example
///
/// ```no_run
/// use kube::{Api, Client};
/// use fleetdns::crd::TrafficManagerProfile;
/// use fleetdns::reconcilers::retry::retry_api_call;
///
/// # async fn example() -> anyhow::Result<()> {
/// let client = Client::try_default().await?;
/// let api: Api<TrafficManagerProfile> = Api::namespaced(client, "default");
///
/// let profile = retry_api_call(
///     || async { api.get("my-profile").await },
///     "get profile my-profile"
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_api_call<T, F, Fut>(mut operation: F, operation_name: &str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, kube::Error>>,
{
    let mut backoff = default_backoff();
    let start_time = Instant::now();
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        "Kubernetes API call succeeded after retries"
                    );
                }
                return Ok(value);
            }
            Err(e) => {
                if !is_retryable_error(&e) {
                    return Err(e.into());
                }

                if let Some(duration) = backoff.next_backoff() {
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        retry_after = ?duration,
                        error = %e,
                        "Retryable Kubernetes API error, will retry"
                    );
                    tokio::time::sleep(duration).await;
                } else {
                    error!(
                        operation = operation_name,
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Backoff exhausted, giving up"
                    );
                    return Err(anyhow::anyhow!(
                        "Backoff exhausted after {attempt} attempts: {e}"
                    ));
                }
            }
        }
    }
}

/// Determine if a Kubernetes error is retryable.
///
/// # Retryable Errors
///
/// - **HTTP 429** (Too Many Requests) - Rate limiting
/// - **HTTP 5xx** (Server Errors) - Temporary API server issues
/// - **Service Errors** - Network/connection issues
///
/// # Non-Retryable Errors
///
/// - **HTTP 4xx** (Client Errors, except 429) - Invalid request, not found,
///   unauthorized, etc.
#[must_use]
pub fn is_retryable_error(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(api_err) => {
            // Retry on rate limiting (429) and server errors (5xx)
            api_err.code == 429 || (api_err.code >= 500 && api_err.code < 600)
        }
        kube::Error::Service(_) => {
            // Network/connection errors are retryable
            true
        }
        _ => {
            // Client errors (invalid request, not found, etc.) are not retryable
            false
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod retry_tests;
