//! # Resource Manager
//!
//! Applies the children composed for one owner, one at a time and in the
//! order they are submitted. Each child is applied with one of three modes:
//!
//! - [`ApplyMode::Tracked`]: owned, created when absent, replaced only when the
//!   live object no longer contains the desired fields
//! - [`ApplyMode::Basic`]: owned, created when absent, replaced on every pass
//! - [`ApplyMode::Instant`]: created once without owner and never touched again
//!
//! [`ResourceManager::ensure`] and [`ResourceManager::ensure_secret`] cover
//! owned objects whose content must never be recomputed once they exist, such
//! as generated credentials.

use super::api::{ApiError, ObjectApi};
use super::diff::{is_up_to_date, normalize_secret};
use crate::controller::password::PasswordError;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::{ChildKind, ManagedResource};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::core::{ApiResource, DynamicObject};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How a child is reconciled against the live object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplyMode {
    Tracked,
    Basic,
    Instant,
}

impl ApplyMode {
    fn is_owned(self) -> bool {
        !matches!(self, Self::Instant)
    }
}

/// A child applied during the current pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub mode: ApplyMode,
}

/// Serialize a typed object into a dynamic one
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(obj)?)
}

/// Decode a dynamic object into its typed form
pub fn from_dynamic<K: DeserializeOwned>(obj: DynamicObject) -> Result<K, serde_json::Error> {
    serde_json::from_value(serde_json::to_value(obj)?)
}

pub struct ResourceManager {
    api: Arc<dyn ObjectApi>,
    owner: OwnerReference,
    namespace: String,
    operator_name: String,
    watched: Vec<ChildKind>,
    cancel: CancellationToken,
    applied: Mutex<Vec<ChildRef>>,
}

impl std::fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceManager")
            .field("owner", &format!("{}/{}", self.owner.kind, self.owner.name))
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl ResourceManager {
    /// Manager for the children of `owner`
    ///
    /// `watched` lists the child kinds whose changes re-trigger the owner's
    /// reconcile; owned children of other kinds are applied but logged.
    pub fn for_owner<K: ManagedResource>(
        api: Arc<dyn ObjectApi>,
        owner: &K,
        operator_name: &str,
        watched: &[ChildKind],
        cancel: CancellationToken,
    ) -> Result<Self, ReconcilerError> {
        let owner_ref = owner.controller_owner_ref(&()).ok_or_else(|| {
            ReconcilerError::Consistency(format!(
                "{} {} has no uid, cannot own children",
                K::kind(&()),
                owner.name_any()
            ))
        })?;
        let namespace = owner.namespace().ok_or_else(|| {
            ReconcilerError::Consistency(format!(
                "{} {} has no namespace",
                K::kind(&()),
                owner.name_any()
            ))
        })?;

        Ok(Self {
            api,
            owner: owner_ref,
            namespace,
            operator_name: operator_name.to_string(),
            watched: watched.to_vec(),
            cancel,
            applied: Mutex::new(Vec::new()),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn operator_name(&self) -> &str {
        &self.operator_name
    }

    pub fn owner(&self) -> &OwnerReference {
        &self.owner
    }

    /// Children applied so far, in submission order
    pub fn applied(&self) -> Vec<ChildRef> {
        self.applied
            .lock()
            .map(|applied| applied.clone())
            .unwrap_or_default()
    }

    /// Fail with [`ReconcilerError::Cancelled`] once shutdown started
    pub fn ensure_active(&self) -> Result<(), ReconcilerError> {
        if self.cancel.is_cancelled() {
            return Err(ReconcilerError::Cancelled);
        }
        Ok(())
    }

    /// Apply one child, returns whether a write happened
    pub async fn add<C>(&self, child: &C, mode: ApplyMode) -> Result<bool, ReconcilerError>
    where
        C: Resource<DynamicType = ()> + Serialize,
    {
        let (ar, desired) = self.prepare(child, mode.is_owned())?;
        let name = desired.name_any();

        let live = self.fetch(&ar, &name).await?;
        let written = match (mode, live) {
            (ApplyMode::Instant, Some(_)) => {
                debug!(kind = %ar.kind, name = %name, "instant child exists, leaving it untouched");
                return Ok(false);
            }
            (_, None) => {
                self.create(&ar, &desired).await?;
                true
            }
            (_, Some(live)) => {
                self.check_controller(&ar, &live)?;
                if mode == ApplyMode::Tracked && is_up_to_date(&live, &desired) {
                    debug!(kind = %ar.kind, name = %name, "child up to date");
                    false
                } else {
                    self.update(&ar, &live, desired).await?;
                    true
                }
            }
        };

        if mode.is_owned() {
            self.record(&ar, &name, mode);
        }
        Ok(written)
    }

    /// Create an owned child when absent, never update it
    ///
    /// Returns the live object and whether it was created.
    pub async fn ensure<C>(&self, child: &C) -> Result<(DynamicObject, bool), ReconcilerError>
    where
        C: Resource<DynamicType = ()> + Serialize,
    {
        let (ar, desired) = self.prepare(child, true)?;
        let name = desired.name_any();

        if let Some(live) = self.fetch(&ar, &name).await? {
            return Ok((live, false));
        }
        match self.create(&ar, &desired).await {
            Ok(created) => Ok((created, true)),
            Err(ReconcilerError::Api {
                source: ApiError::AlreadyExists,
                ..
            }) => {
                // Lost a race with another writer, the winner's content stands
                let live = self.fetch(&ar, &name).await?.ok_or_else(|| {
                    ReconcilerError::Consistency(format!(
                        "{} {name} reported as existing but cannot be read",
                        ar.kind
                    ))
                })?;
                Ok((live, false))
            }
            Err(e) => Err(e),
        }
    }

    /// Owned Secret whose values are generated only when it does not exist yet
    ///
    /// The stored Secret is returned as-is on every later pass, so checksums
    /// computed from it stay stable.
    pub async fn ensure_secret<F>(&self, metadata: ObjectMeta, generate: F) -> Result<Secret, ReconcilerError>
    where
        F: FnOnce() -> Result<BTreeMap<String, String>, PasswordError>,
    {
        let ar = ApiResource::erase::<Secret>(&());
        let name = metadata.name.clone().unwrap_or_default();

        let live = match self.fetch(&ar, &name).await? {
            Some(live) => live,
            None => {
                info!(secret = %name, namespace = %self.namespace, "generating credentials");
                let secret = Secret {
                    metadata,
                    string_data: Some(generate()?),
                    type_: Some("Opaque".to_string()),
                    ..Default::default()
                };
                self.ensure(&secret).await?.0
            }
        };
        self.record(&ar, &name, ApplyMode::Tracked);
        decode(&ar, live)
    }

    /// Read a typed object from the owner's namespace
    pub async fn get<C>(&self, name: &str) -> Result<Option<C>, ReconcilerError>
    where
        C: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let ar = ApiResource::erase::<C>(&());
        self.fetch(&ar, name)
            .await?
            .map(|obj| decode(&ar, obj))
            .transpose()
    }

    /// List typed objects of the owner's namespace by label
    pub async fn list<C>(&self, selector: &BTreeMap<String, String>) -> Result<Vec<C>, ReconcilerError>
    where
        C: Resource<DynamicType = ()> + DeserializeOwned,
    {
        self.ensure_active()?;
        let ar = ApiResource::erase::<C>(&());
        let items = self
            .api
            .list(&ar, &self.namespace, selector)
            .await
            .map_err(ReconcilerError::api("list", &ar.kind, &self.namespace, "*"))?;
        items.into_iter().map(|obj| decode(&ar, obj)).collect()
    }

    /// Replace a typed object as given, keeping the resource version it carries
    pub async fn replace<C>(&self, obj: &C) -> Result<(), ReconcilerError>
    where
        C: Resource<DynamicType = ()> + Serialize,
    {
        self.ensure_active()?;
        let ar = ApiResource::erase::<C>(&());
        let dynamic = encode(&ar, obj)?;
        let name = dynamic.name_any();
        self.api
            .replace(&ar, &self.namespace, &dynamic)
            .await
            .map_err(ReconcilerError::api("update", &ar.kind, &self.namespace, &name))?;
        metrics::increment_child_writes(&ar.kind, "update");
        Ok(())
    }

    /// Delete an object of the owner's namespace, `false` when already absent
    pub async fn delete<C>(&self, name: &str) -> Result<bool, ReconcilerError>
    where
        C: Resource<DynamicType = ()>,
    {
        self.ensure_active()?;
        let ar = ApiResource::erase::<C>(&());
        let deleted = self
            .api
            .delete(&ar, &self.namespace, name)
            .await
            .map_err(ReconcilerError::api("delete", &ar.kind, &self.namespace, name))?;
        if deleted {
            metrics::increment_child_writes(&ar.kind, "delete");
        }
        Ok(deleted)
    }

    fn prepare<C>(&self, child: &C, owned: bool) -> Result<(ApiResource, DynamicObject), ReconcilerError>
    where
        C: Resource<DynamicType = ()> + Serialize,
    {
        self.ensure_active()?;
        let ar = ApiResource::erase::<C>(&());
        let mut obj = encode(&ar, child)?;
        if obj.metadata.name.as_deref().unwrap_or_default().is_empty() {
            return Err(ReconcilerError::Consistency(format!(
                "{} child of {} {} has no name",
                ar.kind, self.owner.kind, self.owner.name
            )));
        }

        obj.metadata.namespace = Some(self.namespace.clone());
        normalize_secret(&mut obj);
        if owned {
            let owners = obj.metadata.owner_references.get_or_insert_with(Vec::new);
            if !owners.iter().any(|o| o.uid == self.owner.uid) {
                owners.push(self.owner.clone());
            }
        }
        Ok((ar, obj))
    }

    async fn fetch(&self, ar: &ApiResource, name: &str) -> Result<Option<DynamicObject>, ReconcilerError> {
        self.ensure_active()?;
        self.api
            .get(ar, &self.namespace, name)
            .await
            .map_err(ReconcilerError::api("get", &ar.kind, &self.namespace, name))
    }

    async fn create(&self, ar: &ApiResource, desired: &DynamicObject) -> Result<DynamicObject, ReconcilerError> {
        self.ensure_active()?;
        let name = desired.name_any();
        let created = self
            .api
            .create(ar, &self.namespace, desired)
            .await
            .map_err(ReconcilerError::api("create", &ar.kind, &self.namespace, &name))?;
        info!(kind = %ar.kind, name = %name, namespace = %self.namespace, "created child");
        metrics::increment_child_writes(&ar.kind, "create");
        Ok(created)
    }

    async fn update(
        &self,
        ar: &ApiResource,
        live: &DynamicObject,
        desired: DynamicObject,
    ) -> Result<(), ReconcilerError> {
        self.ensure_active()?;
        let name = desired.name_any();
        let merged = merge_for_update(live, desired);

        match self.api.replace(ar, &self.namespace, &merged).await {
            Ok(_) => {
                info!(kind = %ar.kind, name = %name, namespace = %self.namespace, "updated child");
                metrics::increment_child_writes(&ar.kind, "update");
                Ok(())
            }
            Err(ApiError::NotFound) => {
                // Deleted since the read, create it from the desired state
                let mut recreate = merged;
                recreate.metadata.resource_version = None;
                self.create(ar, &recreate).await.map(|_| ())
            }
            Err(e) => Err(ReconcilerError::api("update", &ar.kind, &self.namespace, &name)(e)),
        }
    }

    /// A live child controlled by another owner cannot be adopted
    fn check_controller(&self, ar: &ApiResource, live: &DynamicObject) -> Result<(), ReconcilerError> {
        let foreign = live
            .metadata
            .owner_references
            .iter()
            .flatten()
            .find(|o| o.controller == Some(true) && o.uid != self.owner.uid);
        match foreign {
            Some(other) => Err(ReconcilerError::Consistency(format!(
                "{} {} is controlled by {} {}, not {} {}",
                ar.kind,
                live.name_any(),
                other.kind,
                other.name,
                self.owner.kind,
                self.owner.name
            ))),
            None => Ok(()),
        }
    }

    fn record(&self, ar: &ApiResource, name: &str, mode: ApplyMode) {
        let watched = ChildKind::from_type(&ar.api_version, &ar.kind)
            .is_some_and(|kind| self.watched.contains(&kind));
        if !watched {
            warn!(
                kind = %ar.kind,
                name = %name,
                owner = %self.owner.name,
                "child kind is not watched, drift is only corrected on the next owner event"
            );
        }

        if let Ok(mut applied) = self.applied.lock() {
            if !applied.iter().any(|c| c.kind == ar.kind && c.name == name) {
                applied.push(ChildRef {
                    api_version: ar.api_version.clone(),
                    kind: ar.kind.clone(),
                    name: name.to_string(),
                    mode,
                });
            }
        }
    }
}

/// Desired object carrying the live identity, labels and annotations it does not set
fn merge_for_update(live: &DynamicObject, mut desired: DynamicObject) -> DynamicObject {
    desired.metadata.resource_version = live.metadata.resource_version.clone();

    let mut labels = live.metadata.labels.clone().unwrap_or_default();
    labels.extend(desired.metadata.labels.take().unwrap_or_default());
    desired.metadata.labels = Some(labels);

    let mut annotations = live.metadata.annotations.clone().unwrap_or_default();
    annotations.extend(desired.metadata.annotations.take().unwrap_or_default());
    desired.metadata.annotations = Some(annotations);

    let mut owners = live.metadata.owner_references.clone().unwrap_or_default();
    for owner in desired.metadata.owner_references.take().unwrap_or_default() {
        if !owners.iter().any(|o| o.uid == owner.uid) {
            owners.push(owner);
        }
    }
    desired.metadata.owner_references = Some(owners);
    desired
}

fn encode<C: Serialize>(ar: &ApiResource, obj: &C) -> Result<DynamicObject, ReconcilerError> {
    to_dynamic(obj).map_err(|source| ReconcilerError::Serialization {
        kind: ar.kind.clone(),
        source,
    })
}

fn decode<C: DeserializeOwned>(ar: &ApiResource, obj: DynamicObject) -> Result<C, ReconcilerError> {
    from_dynamic(obj).map_err(|source| ReconcilerError::Serialization {
        kind: ar.kind.clone(),
        source,
    })
}
