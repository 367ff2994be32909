//! # Configuration
//!
//! Operator configuration, read once at startup.
//!
//! - `controller`: global settings and per-component overrides

pub mod controller;

pub use controller::{config_prefix, ControllerConfig};
