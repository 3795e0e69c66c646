//! In-process stores
//!
//! Behave like the API server for the operations the reconciler uses:
//! `update` ignores status and checks `resourceVersion`, deleting an object
//! with finalizers only stamps `deletionTimestamp`, and an object is dropped
//! once it is being deleted and its last finalizer is gone.

use super::{merge_patch, to_dynamic, to_typed, ObjectStore, SecretData, SecretStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ApiResource;
use kube::core::DynamicObject;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

type ObjectKey = (String, String, String);

fn key(ar: &ApiResource, name: &str) -> ObjectKey {
    (ar.group.clone(), ar.kind.clone(), name.to_string())
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct ObjectState {
    objects: HashMap<ObjectKey, DynamicObject>,
    next_version: u64,
}

impl ObjectState {
    fn bump(&mut self, obj: &mut DynamicObject) {
        self.next_version += 1;
        obj.metadata.resource_version = Some(self.next_version.to_string());
    }
}

fn is_released(obj: &DynamicObject) -> bool {
    obj.metadata.deletion_timestamp.is_some()
        && obj.metadata.finalizers.as_ref().map_or(true, Vec::is_empty)
}

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<ObjectState>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object as a user would, assigning uid, resourceVersion and
    /// creation timestamp. Status is stored as given.
    pub fn insert(&self, ar: &ApiResource, mut obj: DynamicObject) {
        let mut state = lock(&self.state);
        if obj.metadata.uid.is_none() {
            obj.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        obj.metadata.creation_timestamp = Some(Time(chrono::Utc::now()));
        state.bump(&mut obj);
        let name = obj.metadata.name.clone().unwrap_or_default();
        state.objects.insert(key(ar, &name), obj);
    }

    pub fn insert_typed<K>(&self, obj: &K) -> Result<(), StoreError>
    where
        K: Resource<DynamicType = ()> + Serialize,
    {
        self.insert(&super::api_resource::<K>(), to_dynamic(obj)?);
        Ok(())
    }

    pub fn get_sync<K>(&self, name: &str) -> Option<K>
    where
        K: Resource<DynamicType = ()> + DeserializeOwned,
    {
        let ar = super::api_resource::<K>();
        let obj = lock(&self.state).objects.get(&key(&ar, name)).cloned()?;
        to_typed(obj).ok()
    }

    /// Overwrite the spec of a stored object, as a user edit would
    pub fn edit<K>(&self, name: &str, f: impl FnOnce(&mut K)) -> Result<(), StoreError>
    where
        K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    {
        let ar = super::api_resource::<K>();
        let mut state = lock(&self.state);
        let k = key(&ar, name);
        let current = state.objects.get(&k).cloned().ok_or_else(|| StoreError::NotFound {
            kind: ar.kind.clone(),
            name: name.to_string(),
        })?;
        let mut typed: K = to_typed(current)?;
        f(&mut typed);
        let mut obj = to_dynamic(&typed)?;
        state.bump(&mut obj);
        state.objects.insert(k, obj);
        Ok(())
    }

    pub fn contains(&self, ar: &ApiResource, name: &str) -> bool {
        lock(&self.state).objects.contains_key(&key(ar, name))
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, ar: &ApiResource, name: &str) -> Result<Option<DynamicObject>, StoreError> {
        Ok(lock(&self.state).objects.get(&key(ar, name)).cloned())
    }

    async fn list(
        &self,
        ar: &ApiResource,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let state = lock(&self.state);
        let mut items: Vec<DynamicObject> = state
            .objects
            .iter()
            .filter(|((g, k, _), _)| *g == ar.group && *k == ar.kind)
            .map(|(_, obj)| obj)
            .filter(|obj| {
                let labels = obj.metadata.labels.clone().unwrap_or_default();
                match_labels
                    .iter()
                    .all(|(k, v)| labels.get(k) == Some(v))
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(items)
    }

    async fn update(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        let k = key(ar, &name);
        let mut state = lock(&self.state);
        let stored = state.objects.get(&k).cloned().ok_or_else(|| StoreError::NotFound {
            kind: ar.kind.clone(),
            name: name.clone(),
        })?;
        if let Some(rv) = &obj.metadata.resource_version {
            if stored.metadata.resource_version.as_ref() != Some(rv) {
                return Err(StoreError::Conflict {
                    kind: ar.kind.clone(),
                    name,
                    message: format!(
                        "resourceVersion {rv} is stale (current {})",
                        stored.metadata.resource_version.clone().unwrap_or_default()
                    ),
                });
            }
        }

        let mut updated = obj.clone();
        // Server-owned fields
        updated.metadata.uid = stored.metadata.uid.clone();
        updated.metadata.creation_timestamp = stored.metadata.creation_timestamp.clone();
        updated.metadata.deletion_timestamp = stored.metadata.deletion_timestamp.clone();
        match stored.data.get("status") {
            Some(status) => {
                updated.data["status"] = status.clone();
            }
            None => {
                if let Some(map) = updated.data.as_object_mut() {
                    map.remove("status");
                }
            }
        }
        state.bump(&mut updated);

        if is_released(&updated) {
            state.objects.remove(&k);
        } else {
            state.objects.insert(k, updated.clone());
        }
        Ok(updated)
    }

    async fn update_status(
        &self,
        ar: &ApiResource,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let k = key(ar, name);
        let mut obj = state.objects.get(&k).cloned().ok_or_else(|| StoreError::NotFound {
            kind: ar.kind.clone(),
            name: name.to_string(),
        })?;
        if !obj.data.is_object() {
            obj.data = serde_json::json!({});
        }
        if let Some(map) = obj.data.as_object_mut() {
            merge_patch(map.entry("status").or_insert(serde_json::Value::Null), status);
        }
        state.bump(&mut obj);
        state.objects.insert(k, obj);
        Ok(())
    }

    async fn delete(&self, ar: &ApiResource, name: &str) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        let k = key(ar, name);
        let Some(mut obj) = state.objects.get(&k).cloned() else {
            return Ok(());
        };
        if obj.metadata.finalizers.as_ref().map_or(true, Vec::is_empty) {
            state.objects.remove(&k);
            return Ok(());
        }
        if obj.metadata.deletion_timestamp.is_none() {
            obj.metadata.deletion_timestamp = Some(Time(chrono::Utc::now()));
            state.bump(&mut obj);
            state.objects.insert(k, obj);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<(String, String), SecretData>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, namespace: &str, name: &str, data: SecretData) {
        lock(&self.secrets).insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn get_sync(&self, namespace: &str, name: &str) -> Option<SecretData> {
        lock(&self.secrets)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Value of one key as UTF-8
    pub fn value(&self, namespace: &str, name: &str, key: &str) -> Option<String> {
        self.get_sync(namespace, name)
            .and_then(|d| d.get(key).cloned())
            .and_then(|v| String::from_utf8(v).ok())
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, StoreError> {
        Ok(self.get_sync(namespace, name))
    }

    async fn apply(&self, namespace: &str, name: &str, data: &SecretData) -> Result<(), StoreError> {
        let mut secrets = lock(&self.secrets);
        let entry = secrets
            .entry((namespace.to_string(), name.to_string()))
            .or_default();
        for (k, v) in data {
            entry.insert(k.clone(), v.clone());
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        lock(&self.secrets).remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}
