//! # Object and Secret Stores
//!
//! The reconciler talks to the cluster through two narrow seams:
//!
//! - [`ObjectStore`] reads and writes cluster-scoped custom resources as
//!   [`DynamicObject`]s, so reference resolution can reach kinds this crate
//!   does not define. Typed access goes through [`get_typed`],
//!   [`list_typed`] and [`update_typed`].
//! - [`SecretStore`] reads and merges namespaced secrets.
//!
//! `kubernetes` holds the API-server implementations and `memory` the
//! in-process ones used by tests.

mod kubernetes;
mod memory;

pub use kubernetes::{KubeObjectStore, KubeSecretStore};
pub use memory::{MemoryObjectStore, MemorySecretStore};

use async_trait::async_trait;
use kube::api::ApiResource;
use kube::core::DynamicObject;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Secret payload: key to raw bytes
pub type SecretData = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("conflict writing {kind} '{name}': {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// Cluster-scoped custom resource access
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, ar: &ApiResource, name: &str) -> Result<Option<DynamicObject>, StoreError>;

    /// Objects of a kind whose labels include every `match_labels` entry
    async fn list(
        &self,
        ar: &ApiResource,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError>;

    /// Replace metadata and spec. Status is not written.
    async fn update(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Merge-patch the status subresource
    async fn update_status(
        &self,
        ar: &ApiResource,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Delete an object; an absent object is not an error
    async fn delete(&self, ar: &ApiResource, name: &str) -> Result<(), StoreError>;
}

/// Namespaced secret access
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, StoreError>;

    /// Create the secret or merge `data` into it. Keys not in `data` are kept.
    async fn apply(&self, namespace: &str, name: &str, data: &SecretData) -> Result<(), StoreError>;

    /// Delete a secret; an absent secret is not an error
    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}

/// API resource descriptor of a kind served by this crate
pub fn api_resource<K: Resource<DynamicType = ()>>() -> ApiResource {
    ApiResource::erase::<K>(&())
}

pub fn to_typed<K: DeserializeOwned>(obj: DynamicObject) -> Result<K, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, StoreError> {
    Ok(serde_json::from_value(serde_json::to_value(obj)?)?)
}

pub async fn get_typed<K>(store: &dyn ObjectStore, name: &str) -> Result<Option<K>, StoreError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    store
        .get(&api_resource::<K>(), name)
        .await?
        .map(to_typed)
        .transpose()
}

pub async fn list_typed<K>(
    store: &dyn ObjectStore,
    match_labels: &BTreeMap<String, String>,
) -> Result<Vec<K>, StoreError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    store
        .list(&api_resource::<K>(), match_labels)
        .await?
        .into_iter()
        .map(to_typed)
        .collect()
}

/// Write metadata and spec of a typed object; the returned object carries
/// the stored status, not the caller's
pub async fn update_typed<K>(store: &dyn ObjectStore, obj: &K) -> Result<K, StoreError>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
{
    let updated = store.update(&api_resource::<K>(), &to_dynamic(obj)?).await?;
    to_typed(updated)
}

/// RFC 7386 JSON merge patch
pub(crate) fn merge_patch(target: &mut serde_json::Value, patch: &serde_json::Value) {
    use serde_json::Value;
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(target_map) = target {
        for (k, v) in patch_map {
            if v.is_null() {
                target_map.remove(k);
            } else {
                merge_patch(target_map.entry(k.clone()).or_insert(Value::Null), v);
            }
        }
    }
}

/// Merge patch turning `old` into `new`; removed keys become `null`
pub fn diff_merge_patch(old: &serde_json::Value, new: &serde_json::Value) -> serde_json::Value {
    use serde_json::{Map, Value};
    match (old, new) {
        (Value::Object(old_map), Value::Object(new_map)) => {
            let mut patch = Map::new();
            for (k, v) in new_map {
                match old_map.get(k) {
                    Some(prev) if prev == v => {}
                    Some(prev) => {
                        patch.insert(k.clone(), diff_merge_patch(prev, v));
                    }
                    None => {
                        patch.insert(k.clone(), v.clone());
                    }
                }
            }
            for k in old_map.keys().filter(|k| !new_map.contains_key(*k)) {
                patch.insert(k.clone(), Value::Null);
            }
            Value::Object(patch)
        }
        _ => new.clone(),
    }
}
