//! # Status
//!
//! Status shared by every managed custom resource: conditions keyed by type
//! and the properties a resource exports to its consumers.

use chrono::Utc;
use schemars::{json_schema, JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CONDITION_TRUE: &str = "True";
pub const CONDITION_FALSE: &str = "False";
pub const CONDITION_UNKNOWN: &str = "Unknown";

/// Status of a managed custom resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Generation of the spec the status was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Version of the operator that wrote the status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator_version: Option<String>,
    /// Latest observations, one per condition type
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Values exported to dependent reconcilers, such as database connection settings
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    #[schemars(schema_with = "properties_schema")]
    pub properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    /// True, False or Unknown
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    /// Build a condition stamped with the current time
    pub fn new(
        condition_type: impl Into<String>,
        status: impl Into<String>,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            r#type: condition_type.into(),
            status: status.into(),
            last_transition_time: Some(Utc::now().to_rfc3339()),
            reason: Some(reason.into()),
            message: Some(message.into()),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == CONDITION_TRUE
    }

    /// Equality ignoring `lastTransitionTime`
    pub fn same_observation(&self, other: &Self) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

impl ComponentStatus {
    pub fn condition(&self, condition_type: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == condition_type)
    }

    /// Overwrite the condition of the same type, keeping `lastTransitionTime`
    /// when the status value did not change
    pub fn set_condition(&mut self, new: Condition) {
        match self.conditions.iter_mut().find(|c| c.r#type == new.r#type) {
            Some(existing) if existing.status == new.status => {
                existing.reason = new.reason;
                existing.message = new.message;
            }
            Some(existing) => *existing = new,
            None => self.conditions.push(new),
        }
    }

    /// Equality ignoring condition timestamps, used to skip no-op status writes
    pub fn same_observation(&self, other: &Self) -> bool {
        self.observed_generation == other.observed_generation
            && self.operator_version == other.operator_version
            && self.properties == other.properties
            && self.conditions.len() == other.conditions.len()
            && self.conditions.iter().all(|c| {
                other
                    .condition(&c.r#type)
                    .is_some_and(|o| o.same_observation(c))
            })
    }
}

fn properties_schema(_gen: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "object",
        "description": "Values exported to dependent reconcilers",
        "x-kubernetes-preserve-unknown-fields": true
    })
}
