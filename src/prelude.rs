//! # Prelude
//!
//! Re-exports commonly used types and traits.
//!
//! ```rust
//! use harbor_operator::prelude::*;
//! ```

// CRD types - most commonly used
pub use crate::crd::*;

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    reconcile, BackoffState, ChildComposer, ComposeOutcome, Reconciler, ReconcilerError,
};

// Child application and the API seam
pub use crate::controller::resources::{
    ApiError, ApplyMode, InMemoryApi, KubeApi, ObjectApi, ResourceManager,
};

// Dependent lifecycle
pub use crate::controller::lcm::{CrStatus, Lifecycle, LifecycleState, Properties};

pub use crate::config::ControllerConfig;
