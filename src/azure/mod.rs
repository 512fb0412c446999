// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Azure integration: authentication, error taxonomy, and the Traffic
//! Manager REST client.

pub mod auth;
pub mod errors;
pub mod traffic_manager;

pub use errors::TrafficManagerError;
pub use traffic_manager::{
    AtmEndpoint, AtmEndpointProperties, AtmProfile, AtmProfileProperties, AzureTrafficManagerClient,
    TrafficManager,
};
