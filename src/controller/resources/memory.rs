//! # In-memory object store
//!
//! [`ObjectApi`] over a process-local map, backing the reconcile tests. It
//! keeps the API server semantics the operator relies on:
//!
//! - uid and resource version assignment, with a conflict on a stale replace
//! - `AlreadyExists` on create and `NotFound` on replace of an absent object
//! - status treated as a subresource (replace keeps the stored status)
//! - cascading deletion of dependents through owner references
//!
//! Every create, replace, delete and status patch counts as one write.

use super::api::{ApiError, ObjectApi};
use async_trait::async_trait;
use kube::core::{ApiResource, DynamicObject, TypeMeta};
use kube::Resource;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

type ObjectKey = (String, String, String, String);

#[derive(Debug, Default)]
struct Store {
    objects: BTreeMap<ObjectKey, DynamicObject>,
    last_version: u64,
    writes: usize,
    failing_kinds: Vec<String>,
    vanishing_kinds: Vec<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryApi {
    store: Mutex<Store>,
}

fn key(ar: &ApiResource, namespace: &str, name: &str) -> ObjectKey {
    (
        ar.api_version.clone(),
        ar.kind.clone(),
        namespace.to_string(),
        name.to_string(),
    )
}

impl InMemoryApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // A panicking test thread must not hide the store from the others
        self.store
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Insert an object as if another actor created it; not counted as a write
    pub fn seed<K>(&self, obj: &K) -> Result<DynamicObject, ApiError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        let ar = ApiResource::erase::<K>(&());
        let dynamic: DynamicObject = serde_json::from_value(serde_json::to_value(obj)?)?;
        let namespace = dynamic.metadata.namespace.clone().unwrap_or_default();
        let mut store = self.lock();
        store.insert(&ar, &namespace, dynamic)
    }

    /// Number of writes since creation or the last [`reset_writes`](Self::reset_writes)
    pub fn writes(&self) -> usize {
        self.lock().writes
    }

    pub fn reset_writes(&self) {
        self.lock().writes = 0;
    }

    /// Make every following create or replace of `kind` fail with a conflict
    pub fn fail_writes_of(&self, kind: &str) {
        self.lock().failing_kinds.push(kind.to_string());
    }

    /// Delete the stored object on the next replace of `kind`, which then fails with `NotFound`
    ///
    /// Stands for a deletion racing between a read and the following write.
    pub fn delete_before_next_replace_of(&self, kind: &str) {
        self.lock().vanishing_kinds.push(kind.to_string());
    }

    /// Stored object, without going through the async API
    pub fn object(&self, ar: &ApiResource, namespace: &str, name: &str) -> Option<DynamicObject> {
        self.lock().objects.get(&key(ar, namespace, name)).cloned()
    }

    /// Number of stored objects of one kind in a namespace
    pub fn count(&self, ar: &ApiResource, namespace: &str) -> usize {
        self.lock()
            .objects
            .keys()
            .filter(|(api_version, kind, ns, _)| {
                *api_version == ar.api_version && *kind == ar.kind && ns == namespace
            })
            .count()
    }
}

impl Store {
    fn next_version(&mut self) -> String {
        self.last_version += 1;
        self.last_version.to_string()
    }

    fn insert(
        &mut self,
        ar: &ApiResource,
        namespace: &str,
        mut obj: DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let name = obj
            .metadata
            .name
            .clone()
            .ok_or_else(|| ApiError::Conflict("metadata.name is required".to_string()))?;
        let key = key(ar, namespace, &name);
        if self.objects.contains_key(&key) {
            return Err(ApiError::AlreadyExists);
        }

        obj.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
        obj.metadata.namespace = Some(namespace.to_string());
        obj.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        obj.metadata.resource_version = Some(self.next_version());
        obj.metadata.generation = Some(1);
        self.objects.insert(key, obj.clone());
        Ok(obj)
    }

    fn check_failure(&self, ar: &ApiResource) -> Result<(), ApiError> {
        if self.failing_kinds.iter().any(|k| *k == ar.kind) {
            return Err(ApiError::Conflict(format!("injected failure for {}", ar.kind)));
        }
        Ok(())
    }

    /// Remove an object and, transitively, everything it owns
    fn remove_cascading(&mut self, key: &ObjectKey) -> bool {
        let Some(removed) = self.objects.remove(key) else {
            return false;
        };
        let Some(uid) = removed.metadata.uid else {
            return true;
        };

        let dependents: Vec<ObjectKey> = self
            .objects
            .iter()
            .filter(|(_, obj)| {
                obj.metadata
                    .owner_references
                    .iter()
                    .flatten()
                    .any(|owner| owner.uid == uid)
            })
            .map(|(k, _)| k.clone())
            .collect();
        for dependent in &dependents {
            self.remove_cascading(dependent);
        }
        true
    }
}

fn spec_part(obj: &DynamicObject) -> serde_json::Value {
    let mut data = obj.data.clone();
    if let Some(map) = data.as_object_mut() {
        map.remove("status");
    }
    data
}

/// RFC 7386 merge patch
fn merge(target: &mut serde_json::Value, patch: &serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target), serde_json::Value::Object(patch)) => {
            for (k, v) in patch {
                if v.is_null() {
                    target.remove(k);
                } else {
                    merge(target.entry(k.clone()).or_insert(serde_json::Value::Null), v);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[async_trait]
impl ObjectApi for InMemoryApi {
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ApiError> {
        Ok(self.object(ar, namespace, name))
    }

    async fn list(
        &self,
        ar: &ApiResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, ApiError> {
        let store = self.lock();
        Ok(store
            .objects
            .iter()
            .filter(|((api_version, kind, ns, _), _)| {
                *api_version == ar.api_version && *kind == ar.kind && ns == namespace
            })
            .filter(|(_, obj)| {
                let labels = obj.metadata.labels.clone().unwrap_or_default();
                selector.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(
        &self,
        ar: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let mut store = self.lock();
        store.check_failure(ar)?;
        let mut obj = obj.clone();
        obj.metadata.resource_version = None;
        let created = store.insert(ar, namespace, obj)?;
        store.writes += 1;
        Ok(created)
    }

    async fn replace(
        &self,
        ar: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let mut store = self.lock();
        store.check_failure(ar)?;
        let name = obj.metadata.name.clone().unwrap_or_default();
        let key = key(ar, namespace, &name);
        if let Some(at) = store.vanishing_kinds.iter().position(|k| *k == ar.kind) {
            store.vanishing_kinds.remove(at);
            store.remove_cascading(&key);
        }
        let stored = store.objects.get(&key).cloned().ok_or(ApiError::NotFound)?;

        if let Some(version) = &obj.metadata.resource_version {
            if stored.metadata.resource_version.as_ref() != Some(version) {
                return Err(ApiError::Conflict(format!(
                    "{} {name}: resource version {version} is stale",
                    ar.kind
                )));
            }
        }

        let mut updated = obj.clone();
        updated.types = stored.types.clone();
        updated.metadata.namespace = Some(namespace.to_string());
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.metadata.creation_timestamp = stored.metadata.creation_timestamp.clone();
        updated.metadata.generation = stored.metadata.generation;
        if spec_part(&updated) != spec_part(&stored) {
            updated.metadata.generation = stored.metadata.generation.map(|g| g + 1);
        }
        if let Some(map) = updated.data.as_object_mut() {
            map.remove("status");
            if let Some(status) = stored.data.get("status") {
                map.insert("status".to_string(), status.clone());
            }
        }
        updated.metadata.resource_version = Some(store.next_version());

        store.objects.insert(key, updated.clone());
        store.writes += 1;
        Ok(updated)
    }

    async fn delete(&self, ar: &ApiResource, namespace: &str, name: &str) -> Result<bool, ApiError> {
        let mut store = self.lock();
        let removed = store.remove_cascading(&key(ar, namespace, name));
        if removed {
            store.writes += 1;
        }
        Ok(removed)
    }

    async fn patch_status(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), ApiError> {
        let mut store = self.lock();
        let version = store.next_version();
        let stored = store
            .objects
            .get_mut(&key(ar, namespace, name))
            .ok_or(ApiError::NotFound)?;

        if !stored.data.is_object() {
            stored.data = serde_json::json!({});
        }
        let current = stored
            .data
            .as_object_mut()
            .map(|map| map.entry("status").or_insert(serde_json::Value::Null));
        if let Some(current) = current {
            merge(current, status);
        }
        stored.metadata.resource_version = Some(version);
        store.writes += 1;
        Ok(())
    }
}
