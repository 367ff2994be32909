//! # Harbor Operator
//!
//! A Kubernetes operator deploying Harbor container registries.
//!
//! ## Overview
//!
//! 1. **Harbor** - one top level resource fans out into one resource per component
//! 2. **Components** - each component resource reconciles its ConfigMaps, Secrets,
//!    Services, Deployments, Certificates and Ingresses
//! 3. **HarborCluster** - requests an in-cluster PostgreSQL database and exports
//!    how to reach it once it runs
//!
//! Generated configuration and credentials are digested into pod template
//! annotations, so a change rolls the affected workloads.

use anyhow::Result;
use harbor_operator::runtime::{initialization::initialize, watch_loop::run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init).await
}
