//! # Resources
//!
//! Kubernetes object access and the apply semantics of owned children.
//!
//! ## Module Structure
//!
//! - `api.rs` - `ObjectApi` trait, API server implementation and error taxonomy
//! - `memory.rs` - In-process `ObjectApi` backing the tests
//! - `diff.rs` - Desired/live subset comparison
//! - `manager.rs` - `ResourceManager` and its apply modes

mod api;
mod diff;
mod manager;
mod memory;

pub use api::{ApiError, KubeApi, ObjectApi};
pub use diff::{contains, is_up_to_date, normalize_secret};
pub use manager::{from_dynamic, to_dynamic, ApplyMode, ChildRef, ResourceManager};
pub use memory::InMemoryApi;
