//! # Status Updates
//!
//! Builds the status of a managed resource from the outcome of a pass and
//! writes it only when something other than a timestamp changed, so a
//! converged resource does not keep triggering watch events on itself.

use crate::constants::{APPLIED_CONDITION, OPERATOR_VERSION};
use crate::controller::reconciler::{ComposeOutcome, ReconcilerError};
use crate::controller::resources::ObjectApi;
use crate::crd::{ComponentStatus, Condition, ManagedResource, CONDITION_FALSE, CONDITION_TRUE};
use kube::core::ApiResource;
use kube::ResourceExt;
use serde_json::Value;
use tracing::debug;

/// Status after a successful pass that applied `applied` children
pub fn succeeded<K: ManagedResource>(obj: &K, outcome: &ComposeOutcome, applied: usize) -> ComponentStatus {
    let mut status = base(obj);
    status.set_condition(Condition::new(
        APPLIED_CONDITION,
        CONDITION_TRUE,
        "Applied",
        format!("{applied} children applied"),
    ));
    for condition in &outcome.conditions {
        status.set_condition(condition.clone());
    }
    status.properties = outcome.properties.clone();
    status
}

/// Status after a failed pass; previously exported properties are kept
pub fn failed<K: ManagedResource>(obj: &K, error: &ReconcilerError) -> ComponentStatus {
    let mut status = base(obj);
    status.set_condition(Condition::new(
        APPLIED_CONDITION,
        CONDITION_FALSE,
        error.reason(),
        error.to_string(),
    ));
    status
}

fn base<K: ManagedResource>(obj: &K) -> ComponentStatus {
    let mut status = obj.status().cloned().unwrap_or_default();
    status.observed_generation = obj.meta().generation;
    status.operator_version = Some(OPERATOR_VERSION.to_string());
    status
}

/// Write `status` unless it matches the current one; returns whether a write happened
pub async fn write_status<K: ManagedResource>(
    api: &dyn ObjectApi,
    obj: &K,
    status: &ComponentStatus,
) -> Result<bool, ReconcilerError> {
    let current = obj.status().cloned().unwrap_or_default();
    if current.same_observation(status) {
        debug!(resource = %obj.name_any(), "Skipping status update - status unchanged");
        return Ok(false);
    }

    let ar = ApiResource::erase::<K>(&());
    let namespace = obj.namespace().unwrap_or_default();
    let name = obj.name_any();
    let patch = status_patch(&current, status).map_err(|source| ReconcilerError::Serialization {
        kind: ar.kind.clone(),
        source,
    })?;

    api.patch_status(&ar, &namespace, &name, &patch)
        .await
        .map_err(ReconcilerError::api("update status of", &ar.kind, &namespace, &name))?;
    Ok(true)
}

/// Merge patch turning `current` into `desired`, nulling properties that are gone
fn status_patch(current: &ComponentStatus, desired: &ComponentStatus) -> Result<Value, serde_json::Error> {
    let mut patch = serde_json::to_value(desired)?;
    let removed: serde_json::Map<String, Value> = current
        .properties
        .keys()
        .filter(|key| !desired.properties.contains_key(*key))
        .map(|key| (key.clone(), Value::Null))
        .collect();

    if !removed.is_empty() {
        if let Some(map) = patch.as_object_mut() {
            let properties = map
                .entry("properties")
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(properties) = properties {
                properties.extend(removed);
            }
        }
    }
    Ok(patch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_nulls_removed_properties() {
        let mut current = ComponentStatus::default();
        current.properties.insert("database".to_string(), json!({"username": "harbor"}));
        let desired = ComponentStatus::default();

        let patch = status_patch(&current, &desired).expect("serializable");
        assert_eq!(patch["properties"]["database"], Value::Null);
    }

    #[test]
    fn test_patch_carries_new_properties() {
        let current = ComponentStatus::default();
        let mut desired = ComponentStatus::default();
        desired.properties.insert("database".to_string(), json!({"sslMode": "require"}));

        let patch = status_patch(&current, &desired).expect("serializable");
        assert_eq!(patch["properties"]["database"]["sslMode"], json!("require"));
    }
}
