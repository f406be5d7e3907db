// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Print or write the `TenantControlPlane` CRD manifest.
//!
//! ```bash
//! cargo run --bin crdgen                      # deploy/crds/tenantcontrolplanes.crd.yaml
//! cargo run --bin crdgen -- --output -        # stdout, e.g. piped into kubectl apply -f -
//! ```

use anyhow::{Context as _, Result};
use clap::Parser;
use kube::CustomResourceExt;
use std::path::PathBuf;
use steward::crd::TenantControlPlane;

const GENERATED_NOTICE: &str = "# Generated from src/crd.rs by `cargo run --bin crdgen`, do not edit.\n";

#[derive(Parser, Debug)]
#[command(name = "crdgen", about = "Render the TenantControlPlane CRD")]
struct Args {
    /// Destination file, `-` for stdout.
    #[arg(long, default_value = "deploy/crds/tenantcontrolplanes.crd.yaml")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let manifest = format!(
        "{GENERATED_NOTICE}{}",
        serde_yaml::to_string(&TenantControlPlane::crd()).context("failed to render CRD")?
    );

    if args.output.as_os_str() == "-" {
        print!("{manifest}");
        return Ok(());
    }
    if let Some(dir) = args.output.parent() {
        std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    std::fs::write(&args.output, manifest)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    eprintln!("wrote {}", args.output.display());
    Ok(())
}
