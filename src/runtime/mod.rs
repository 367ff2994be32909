//! # Runtime
//!
//! Process level wiring of the operator.
//!
//! - `initialization`: rustls, tracing, metrics server, configuration and client
//! - `watch_loop`: one controller per managed resource kind
//! - `error_policy`: per-resource backoff after failed reconciles

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
