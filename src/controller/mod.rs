//! # Controller
//!
//! Core controller modules for the Harbor operator.
//!
//! - `backoff`: Fibonacci backoff for failed reconciles
//! - `checksum`: configuration and secret digests driving rollouts
//! - `components`: one child composer per managed resource kind
//! - `filter`: operator class filter
//! - `lcm`: lifecycle of externally operated dependents (PostgreSQL)
//! - `password`: credential generation policies
//! - `reconciler`: generic reconcile loop and status handling
//! - `resources`: API seam and the resource manager applying children
//! - `server`: HTTP server for metrics and health checks
//! - `templates`: configuration templates loaded once at startup

pub mod backoff;
pub mod checksum;
pub mod components;
pub mod filter;
pub mod lcm;
pub mod password;
pub mod reconciler;
pub mod resources;
pub mod server;
pub mod templates;
