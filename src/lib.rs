// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # fleetdns - Azure Traffic Manager Operator for Kubernetes Fleets
//!
//! fleetdns is a Kubernetes controller written in Rust that exposes
//! multi-cluster services through Azure Traffic Manager. Member clusters
//! export services to a hub cluster; the hub aggregates them into
//! `ServiceImport`s, and a `TrafficManagerBackend` attaches the per-cluster
//! endpoints to a DNS-level traffic routing profile with weighted
//! distribution.
//!
//! ## Overview
//!
//! This library provides the core functionality of the operator, including:
//!
//! - Custom Resource Definitions (CRDs) for profiles, backends, service
//!   imports, and per-cluster export records
//! - Reconciliation logic that converges Azure Traffic Manager endpoints to
//!   the desired weighted state
//! - Proportional weight apportionment across exporting member clusters
//! - An ARM REST client for the Traffic Manager API
//!
//! ## Modules
//!
//! - [`crd`] - Custom Resource Definition types
//! - [`reconcilers`] - Reconciliation logic for the backend resource
//! - [`azure`] - Traffic Manager client, auth, and error taxonomy
//! - [`context`] - Shared controller context with reflector stores
//!
//! ## Example
//!
//! ```rust,no_run
//! use fleetdns::crd::{BackendReference, ProfileReference, TrafficManagerBackendSpec};
//!
//! // Attach the "store" service import to the "team-a-profile" profile,
//! // splitting a total weight of 100 across its exporting clusters.
//! let spec = TrafficManagerBackendSpec {
//!     profile: ProfileReference {
//!         name: "team-a-profile".to_string(),
//!     },
//!     backend: BackendReference {
//!         name: "store".to_string(),
//!     },
//!     weight: Some(100),
//! };
//! ```
//!
//! ## Features
//!
//! - **Deterministic ownership** - Endpoint names embed the backend UID, so
//!   concurrent backends under one profile never collide
//! - **Weighted routing** - Total weight is split proportionally to the
//!   per-cluster export weights
//! - **Status tracking** - A single `Accepted` condition plus the accepted
//!   endpoint list, recomputed every reconcile

pub mod azure;
pub mod constants;
pub mod context;
pub mod crd;
pub mod labels;
pub mod metrics;
pub mod reconcilers;
pub mod status_reasons;
