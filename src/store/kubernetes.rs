//! API-server backed stores

use super::{ObjectStore, SecretData, SecretStore, StoreError};
use crate::constants::FIELD_MANAGER;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::api::{Api, ApiResource, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::DynamicObject;
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

fn label_selector(match_labels: &BTreeMap<String, String>) -> String {
    match_labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn classify(err: kube::Error, kind: &str, name: &str) -> StoreError {
    match err {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        },
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict {
            kind: kind.to_string(),
            name: name.to_string(),
            message: api_err.message,
        },
        other => StoreError::Kube(other),
    }
}

#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
}

impl std::fmt::Debug for KubeObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore").finish_non_exhaustive()
    }
}

impl KubeObjectStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, ar: &ApiResource) -> Api<DynamicObject> {
        Api::all_with(self.client.clone(), ar)
    }
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn get(&self, ar: &ApiResource, name: &str) -> Result<Option<DynamicObject>, StoreError> {
        self.api(ar)
            .get_opt(name)
            .await
            .map_err(|e| classify(e, &ar.kind, name))
    }

    async fn list(
        &self,
        ar: &ApiResource,
        match_labels: &BTreeMap<String, String>,
    ) -> Result<Vec<DynamicObject>, StoreError> {
        let mut lp = ListParams::default();
        if !match_labels.is_empty() {
            lp = lp.labels(&label_selector(match_labels));
        }
        let list = self
            .api(ar)
            .list(&lp)
            .await
            .map_err(|e| classify(e, &ar.kind, ""))?;
        Ok(list.items)
    }

    async fn update(&self, ar: &ApiResource, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        debug!(kind = %ar.kind, name = %name, "replacing object");
        let pp = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..PostParams::default()
        };
        self.api(ar)
            .replace(&name, &pp, obj)
            .await
            .map_err(|e| classify(e, &ar.kind, &name))
    }

    async fn update_status(
        &self,
        ar: &ApiResource,
        name: &str,
        status: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let patch = serde_json::json!({ "status": status });
        self.api(ar)
            .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
            .await
            .map_err(|e| classify(e, &ar.kind, name))?;
        Ok(())
    }

    async fn delete(&self, ar: &ApiResource, name: &str) -> Result<(), StoreError> {
        match self.api(ar).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(classify(e, &ar.kind, name)),
        }
    }
}

#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn to_byte_strings(data: &SecretData) -> BTreeMap<String, ByteString> {
    data.iter()
        .map(|(k, v)| (k.clone(), ByteString(v.clone())))
        .collect()
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<SecretData>, StoreError> {
        let secret = self
            .api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| classify(e, "Secret", name))?;
        Ok(secret.map(|s| {
            s.data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, v.0))
                .collect()
        }))
    }

    async fn apply(&self, namespace: &str, name: &str, data: &SecretData) -> Result<(), StoreError> {
        let api = self.api(namespace);
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(to_byte_strings(data)),
            ..Secret::default()
        };

        let exists = api
            .get_opt(name)
            .await
            .map_err(|e| classify(e, "Secret", name))?
            .is_some();
        if !exists {
            match api.create(&PostParams::default(), &secret).await {
                Ok(_) => return Ok(()),
                // Lost a race with another writer; fall through to merge
                Err(kube::Error::Api(api_err)) if api_err.code == 409 => {}
                Err(e) => return Err(classify(e, "Secret", name)),
            }
        }

        api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&secret))
            .await
            .map_err(|e| classify(e, "Secret", name))?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(classify(e, "Secret", name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_selector() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "db".to_string());
        labels.insert("env".to_string(), "prod".to_string());
        assert_eq!(label_selector(&labels), "app=db,env=prod");
    }
}
