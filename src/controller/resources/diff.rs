//! Desired/live comparison for tracked children.
//!
//! The desired object only carries the fields the operator sets. The live
//! object additionally carries everything the API server and other
//! controllers fill in (defaults, status, uid, managed fields, ...). A live
//! object is up to date when it contains the desired one.

use base64::Engine as _;
use kube::core::DynamicObject;
use serde_json::Value;

/// Whether `live` contains every value of `desired`
///
/// Objects compare key by key, arrays element-wise with equal length, scalars
/// by equality. An empty desired array or object, or a desired `null`, also
/// matches an absent live field since the API server drops those.
pub fn contains(live: Option<&Value>, desired: &Value) -> bool {
    match (live, desired) {
        (None | Some(Value::Null), d) => is_empty(d),
        (Some(Value::Object(live)), Value::Object(desired)) => desired
            .iter()
            .all(|(k, v)| contains(live.get(k), v)),
        (Some(Value::Array(live)), Value::Array(desired)) => {
            live.len() == desired.len()
                && live.iter().zip(desired).all(|(l, d)| contains(Some(l), d))
        }
        (Some(live), desired) => live == desired,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.values().all(is_empty),
        _ => false,
    }
}

/// Whether the live child already matches the desired child
///
/// Compared: labels, annotations, owner references (by uid) and every
/// top level field except `metadata` and `status`.
pub fn is_up_to_date(live: &DynamicObject, desired: &DynamicObject) -> bool {
    let live_meta = &live.metadata;
    let desired_meta = &desired.metadata;

    let labels_match = desired_meta
        .labels
        .iter()
        .flatten()
        .all(|(k, v)| live_meta.labels.as_ref().and_then(|l| l.get(k)) == Some(v));
    let annotations_match = desired_meta
        .annotations
        .iter()
        .flatten()
        .all(|(k, v)| live_meta.annotations.as_ref().and_then(|a| a.get(k)) == Some(v));
    let owners_match = desired_meta.owner_references.iter().flatten().all(|desired| {
        live_meta
            .owner_references
            .iter()
            .flatten()
            .any(|live| live.uid == desired.uid && live.controller == desired.controller)
    });

    labels_match && annotations_match && owners_match && data_contains(&live.data, &desired.data)
}

fn data_contains(live: &Value, desired: &Value) -> bool {
    let Value::Object(desired) = desired else {
        return contains(Some(live), desired);
    };
    desired
        .iter()
        .filter(|(k, _)| k.as_str() != "status" && k.as_str() != "metadata")
        .all(|(k, v)| contains(live.get(k), v))
}

/// Fold a Secret's `stringData` into base64 `data`, as the API server does on write
pub fn normalize_secret(obj: &mut DynamicObject) {
    let is_secret = obj
        .types
        .as_ref()
        .is_some_and(|t| t.kind == "Secret" && t.api_version == "v1");
    if !is_secret {
        return;
    }
    let Some(map) = obj.data.as_object_mut() else {
        return;
    };
    let Some(Value::Object(string_data)) = map.remove("stringData") else {
        return;
    };

    let data = map
        .entry("data")
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    if let Value::Object(data) = data {
        for (key, value) in string_data {
            if let Value::String(s) = value {
                let encoded = base64::engine::general_purpose::STANDARD.encode(s.as_bytes());
                data.insert(key, Value::String(encoded));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_defaults_are_ignored() {
        let desired = json!({"spec": {"replicas": 1, "template": {"spec": {"containers": [{"name": "core"}]}}}});
        let live = json!({"spec": {
            "replicas": 1,
            "progressDeadlineSeconds": 600,
            "template": {"spec": {"containers": [{"name": "core", "imagePullPolicy": "IfNotPresent"}]}}
        }});
        assert!(contains(Some(&live), &desired));
    }

    #[test]
    fn test_changed_value_is_detected() {
        let desired = json!({"spec": {"replicas": 2}});
        let live = json!({"spec": {"replicas": 1}});
        assert!(!contains(Some(&live), &desired));
    }

    #[test]
    fn test_array_length_matters() {
        let desired = json!({"ports": [{"port": 80}]});
        let live = json!({"ports": [{"port": 80}, {"port": 443}]});
        assert!(!contains(Some(&live), &desired));
    }

    #[test]
    fn test_empty_desired_matches_absent() {
        let desired = json!({"spec": {"env": [], "selector": {}}});
        let live = json!({"spec": {}});
        assert!(contains(Some(&live), &desired));
    }

    #[test]
    fn test_normalize_secret_encodes_string_data() {
        let mut obj: DynamicObject = serde_json::from_value(json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": {"name": "s"},
            "stringData": {"password": "hunter2"}
        }))
        .expect("dynamic");
        normalize_secret(&mut obj);

        assert!(obj.data.get("stringData").is_none());
        assert_eq!(obj.data["data"]["password"], json!("aHVudGVyMg=="));
    }
}
