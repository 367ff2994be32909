//! # Object API
//!
//! The slice of the Kubernetes API the operator depends on: get, label
//! selected list, create, replace, delete and status patch over dynamically
//! typed objects. Everything above this trait is independent of the client.

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject, TypeMeta};
use kube::Client;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("object not found")]
    NotFound,
    #[error("object already exists")]
    AlreadyExists,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("object cannot be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Kube(kube::Error),
}

impl From<kube::Error> for ApiError {
    fn from(error: kube::Error) -> Self {
        match &error {
            kube::Error::Api(api_err) if api_err.code == 404 => Self::NotFound,
            kube::Error::Api(api_err) if api_err.code == 409 && api_err.reason == "AlreadyExists" => {
                Self::AlreadyExists
            }
            kube::Error::Api(api_err) if api_err.code == 409 => {
                Self::Conflict(api_err.message.clone())
            }
            _ => Self::Kube(error),
        }
    }
}

/// Namespaced object access used by the resource manager and the lifecycle controllers
#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Fetch an object, `None` when absent
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ApiError>;

    /// List objects carrying every label of `selector`
    async fn list(
        &self,
        ar: &ApiResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, ApiError>;

    async fn create(
        &self,
        ar: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError>;

    /// Replace an object; a set `metadata.resourceVersion` must match the stored one
    async fn replace(
        &self,
        ar: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError>;

    /// Delete an object, `false` when it was already absent
    async fn delete(&self, ar: &ApiResource, namespace: &str, name: &str) -> Result<bool, ApiError>;

    /// Merge `status` into the status subresource
    async fn patch_status(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), ApiError>;
}

/// [`ObjectApi`] backed by the API server
#[derive(Clone)]
pub struct KubeApi {
    client: Client,
}

impl std::fmt::Debug for KubeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeApi").finish_non_exhaustive()
    }
}

impl KubeApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, ar: &ApiResource, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, ar)
    }
}

/// List items come back without `apiVersion`/`kind`
fn with_types(mut obj: DynamicObject, ar: &ApiResource) -> DynamicObject {
    if obj.types.is_none() {
        obj.types = Some(TypeMeta {
            api_version: ar.api_version.clone(),
            kind: ar.kind.clone(),
        });
    }
    obj
}

fn selector_string(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[async_trait]
impl ObjectApi for KubeApi {
    async fn get(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
    ) -> Result<Option<DynamicObject>, ApiError> {
        let obj = self.api(ar, namespace).get_opt(name).await?;
        Ok(obj.map(|o| with_types(o, ar)))
    }

    async fn list(
        &self,
        ar: &ApiResource,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, ApiError> {
        let params = ListParams::default().labels(&selector_string(selector));
        let list = self.api(ar, namespace).list(&params).await?;
        Ok(list.items.into_iter().map(|o| with_types(o, ar)).collect())
    }

    async fn create(
        &self,
        ar: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let created = self
            .api(ar, namespace)
            .create(&PostParams::default(), obj)
            .await?;
        Ok(with_types(created, ar))
    }

    async fn replace(
        &self,
        ar: &ApiResource,
        namespace: &str,
        obj: &DynamicObject,
    ) -> Result<DynamicObject, ApiError> {
        let name = obj.metadata.name.as_deref().unwrap_or_default();
        let replaced = self
            .api(ar, namespace)
            .replace(name, &PostParams::default(), obj)
            .await?;
        Ok(with_types(replaced, ar))
    }

    async fn delete(&self, ar: &ApiResource, namespace: &str, name: &str) -> Result<bool, ApiError> {
        match self
            .api(ar, namespace)
            .delete(name, &DeleteParams::background())
            .await
            .map_err(ApiError::from)
        {
            Ok(_) => Ok(true),
            Err(ApiError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn patch_status(
        &self,
        ar: &ApiResource,
        namespace: &str,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), ApiError> {
        self.api(ar, namespace)
            .patch_status(
                name,
                &PatchParams::default(),
                &Patch::Merge(serde_json::json!({ "status": status })),
            )
            .await?;
        Ok(())
    }
}
