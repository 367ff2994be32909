//! # Lifecycle Management
//!
//! Tracks a dependent service operated by someone else, such as a database
//! cluster run by its own operator. A [`Lifecycle`] implementation inspects
//! the dependent resource and reports its state as a [`CrStatus`]: one
//! condition plus the properties consumers need to connect to it.
//!
//! ```text
//! Unknown -> Creating -> Ready <-> NotReady -> Deleting -> Gone
//!    any state -> Error (terminal)
//! ```

pub mod database;

use crate::controller::reconciler::ReconcilerError;
use crate::controller::resources::ResourceManager;
use crate::crd::{Condition, CONDITION_FALSE, CONDITION_TRUE, CONDITION_UNKNOWN};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Unknown,
    Creating,
    Ready,
    NotReady,
    Deleting,
    Gone,
    Error,
}

impl LifecycleState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: Self) -> bool {
        use LifecycleState::{Creating, Deleting, Error, Gone, NotReady, Ready, Unknown};

        match (self, next) {
            (Error, next) => next == Error,
            (_, Error) => true,
            (current, next) if current == next => true,
            (Unknown, _) => true,
            (Creating, Ready | NotReady | Deleting) => true,
            // An update moves a converged dependent back to Unknown until checked again
            (Ready | NotReady, Ready | NotReady | Unknown | Deleting) => true,
            (Deleting, Gone) => true,
            (Gone, Creating) => true,
            _ => false,
        }
    }

    /// Condition status representing the state
    pub fn condition_status(self) -> &'static str {
        match self {
            Self::Ready => CONDITION_TRUE,
            Self::NotReady | Self::Deleting | Self::Gone | Self::Error => CONDITION_FALSE,
            Self::Unknown | Self::Creating => CONDITION_UNKNOWN,
        }
    }
}

/// Values exported by a dependent, keyed by property name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(BTreeMap<String, serde_json::Value>);

impl Properties {
    pub fn add<T: Serialize>(&mut self, name: &str, value: &T) -> Result<(), serde_json::Error> {
        self.0.insert(name.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, serde_json::Value> {
        self.0
    }
}

/// Outcome of one lifecycle operation
#[derive(Debug, Clone, PartialEq)]
pub struct CrStatus {
    pub condition: Condition,
    pub state: LifecycleState,
    pub properties: Properties,
}

impl CrStatus {
    pub fn new(condition_type: &str) -> Self {
        let state = LifecycleState::Unknown;
        Self {
            condition: Condition::new(condition_type, state.condition_status(), "", ""),
            state,
            properties: Properties::default(),
        }
    }

    #[must_use]
    pub fn with_state(mut self, state: LifecycleState) -> Self {
        self.state = state;
        self.condition.status = state.condition_status().to_string();
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.condition.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.condition.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn is_ready(&self) -> bool {
        self.state == LifecycleState::Ready
    }

    pub fn has_reason(&self, reason: &str) -> bool {
        self.condition.reason.as_deref() == Some(reason)
    }

    /// Move on to the status reported by the next operation
    ///
    /// A move the state machine forbids means the dependent reported
    /// contradicting states within one pass.
    pub fn transition(self, next: CrStatus) -> Result<CrStatus, ReconcilerError> {
        if self.state.can_transition_to(next.state) {
            return Ok(next);
        }
        Err(ReconcilerError::Consistency(format!(
            "{} cannot move from {:?} to {:?}",
            self.condition.r#type, self.state, next.state
        )))
    }
}

/// Lifecycle of one dependent resource
///
/// Every operation is idempotent. Transient API failures are returned as
/// errors for the caller to retry; expected waiting states are reported
/// through the returned status.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Create the dependent when it does not exist
    async fn apply(&self, resources: &ResourceManager) -> Result<CrStatus, ReconcilerError>;

    /// Inspect the dependent and export its connection properties once it serves traffic
    async fn readiness(&self, resources: &ResourceManager) -> Result<CrStatus, ReconcilerError>;

    /// Bring the dependent's spec back to the expected one
    async fn update(&self, resources: &ResourceManager) -> Result<CrStatus, ReconcilerError>;

    /// Delete the dependent; an absent dependent is already gone
    async fn delete(&self, resources: &ResourceManager) -> Result<CrStatus, ReconcilerError>;
}
