// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates Kubernetes CRD YAML files from the Rust types defined in
//! src/crd.rs. This ensures the YAML files in deploy/crds/ are always in
//! sync with the Rust code.
//!
//! Usage:
//!   cargo run --bin crdgen
//!   cargo run --bin crdgen -- --output-dir /tmp/crds

use clap::Parser;
use fleetdns::crd::{
    InternalServiceExport, ServiceImport, TrafficManagerBackend, TrafficManagerProfile,
};
use kube::CustomResourceExt;
use std::fs;
use std::path::{Path, PathBuf};

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

/// Generate CRD YAML manifests for all fleetdns resources
#[derive(Parser)]
#[command(name = "crdgen", version, about)]
struct Args {
    /// Directory to write the generated manifests into
    #[arg(long, default_value = "deploy/crds")]
    output_dir: PathBuf,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    fs::create_dir_all(&args.output_dir)?;

    println!("Generating CRD YAML files from src/crd.rs...");

    generate_crd::<TrafficManagerProfile>("trafficmanagerprofiles.crd.yaml", &args.output_dir)?;
    generate_crd::<TrafficManagerBackend>("trafficmanagerbackends.crd.yaml", &args.output_dir)?;
    generate_crd::<ServiceImport>("serviceimports.crd.yaml", &args.output_dir)?;
    generate_crd::<InternalServiceExport>("internalserviceexports.crd.yaml", &args.output_dir)?;

    println!(
        "Successfully generated CRD YAML files in {}",
        args.output_dir.display()
    );
    println!("\nNext steps:");
    println!("  1. Review the generated files");
    println!("  2. Deploy with: kubectl apply -f {}", args.output_dir.display());

    Ok(())
}

fn generate_crd<K: CustomResourceExt>(
    filename: &str,
    output_dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let crd = K::crd();
    let yaml = serde_yaml::to_string(&crd)?;
    let path = output_dir.join(filename);
    fs::write(&path, format!("{COPYRIGHT_HEADER}{yaml}"))?;
    println!("  wrote {}", path.display());
    Ok(())
}
