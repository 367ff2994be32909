//! Harbor Operator Library
//!
//! Reconcilers deploying a Harbor container registry from custom resources,
//! and the lifecycle controller of its in-cluster PostgreSQL database.
//!
//! ## Quick Start
//!
//! ```rust
//! use harbor_operator::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
