//! # Child Composers
//!
//! A composer builds the desired children of one resource kind and submits
//! them, in order, to the resource manager.

use crate::controller::reconciler::ReconcilerError;
use crate::controller::resources::ResourceManager;
use crate::crd::{ChildKind, Condition, ManagedResource};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// What a successful compose pass reports back to the reconciler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeOutcome {
    /// Conditions written next to `Applied`, overwritten by type
    pub conditions: Vec<Condition>,
    /// Properties exported on the resource status
    pub properties: BTreeMap<String, serde_json::Value>,
    /// Poll again after this delay even without a watch event
    pub requeue_after: Option<Duration>,
}

impl ComposeOutcome {
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn requeue_after(mut self, delay: Duration) -> Self {
        self.requeue_after = Some(delay);
        self
    }
}

#[async_trait]
pub trait ChildComposer<K: ManagedResource>: Send + Sync {
    /// Child kinds the controller watches on behalf of `K`
    fn owned_kinds(&self) -> &'static [ChildKind];

    /// Apply every child of `owner`; the first failing child aborts the pass
    async fn compose(
        &self,
        owner: &K,
        resources: &ResourceManager,
    ) -> Result<ComposeOutcome, ReconcilerError>;
}
