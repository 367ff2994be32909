//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions owned by the operator as YAML.
//!
//! ## Usage
//!
//! ```bash
//! # Every CRD
//! cargo run --bin crdgen > config/crd/harbor-operator.yaml
//!
//! # One kind, applied directly
//! cargo run --bin crdgen -- --kind HarborCluster | kubectl apply -f -
//! ```

use clap::Parser;
use harbor_operator::crd::owned_crds;

#[derive(Debug, Parser)]
#[command(name = "crdgen", about = "Print the operator CRDs as YAML")]
struct Args {
    /// Only print the CRD of this kind
    #[arg(long)]
    kind: Option<String>,
}

fn main() {
    let args = Args::parse();

    let crds: Vec<_> = owned_crds()
        .into_iter()
        .filter(|crd| {
            args.kind
                .as_deref()
                .is_none_or(|kind| crd.spec.names.kind.eq_ignore_ascii_case(kind))
        })
        .collect();
    if crds.is_empty() {
        eprintln!("No CRD matches kind {:?}", args.kind.unwrap_or_default());
        std::process::exit(1);
    }

    println!("# This file is auto-generated by crdgen");
    println!("# DO NOT EDIT THIS FILE MANUALLY");
    println!("# Fix schema issues in the Rust types under src/crd/");
    for crd in crds {
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD {}: {e}", crd.spec.names.kind);
                std::process::exit(1);
            }
        }
    }
}
