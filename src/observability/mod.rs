//! # Observability
//!
//! Prometheus metrics collection. Tracing is configured in `runtime::initialization`.

pub mod metrics;

pub use metrics::*;
