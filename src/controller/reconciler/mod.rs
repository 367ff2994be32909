//! # Reconciler
//!
//! Generic reconciliation of managed resources.
//!
//! The reconciler:
//! - Fetches the managed resource and applies the operator class filter
//! - Delegates child construction to the kind's [`ChildComposer`]
//! - Writes `Applied` plus composer conditions onto the resource status
//! - Parks unimplemented components until their spec changes
//!
//! ## Module Structure
//!
//! - `composer.rs` - `ChildComposer` trait and `ComposeOutcome`
//! - `reconcile.rs` - The reconcile pass
//! - `status.rs` - Status construction and change-only writes
//! - `types.rs` - Error taxonomy, backoff state and controller context

pub mod composer;
pub mod reconcile;
pub mod status;
pub mod types;

pub use composer::{ChildComposer, ComposeOutcome};
pub use reconcile::reconcile;
pub use types::{BackoffState, Reconciler, ReconcilerError};
