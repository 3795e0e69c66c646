//! # Service Factory
//!
//! Resolves a resource's `providerConfigRef` into AWS SDK configuration and
//! hands out service clients. Loaded configurations are cached per
//! `(ProviderConfig, resourceVersion, region)` so credential providers are
//! not rebuilt on every reconcile.

use crate::crd::{CredentialsSource, ProviderConfig};
use crate::managed::external::ExternalError;
use crate::provider::batch::{sdk::SdkBatch, BatchApi};
use crate::provider::dynamodb::{sdk::SdkDynamoDb, DynamoDbApi};
use crate::provider::lambda::{sdk::SdkLambda, LambdaApi};
use crate::provider::rds::{sdk::SdkRds, RdsApi};
use crate::store::{get_typed, ObjectStore, SecretStore};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const KEY_ACCESS_KEY_ID: &str = "aws_access_key_id";
const KEY_SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
const KEY_SESSION_TOKEN: &str = "aws_session_token";

/// Hands out per-service clients for a `(ProviderConfig, region)` pair
#[async_trait]
pub trait ServiceFactory: Send + Sync {
    async fn rds(&self, provider_config: &str, region: &str) -> Result<Arc<dyn RdsApi>, ExternalError>;
    async fn batch(&self, provider_config: &str, region: &str) -> Result<Arc<dyn BatchApi>, ExternalError>;
    async fn dynamodb(&self, provider_config: &str, region: &str) -> Result<Arc<dyn DynamoDbApi>, ExternalError>;
    async fn lambda(&self, provider_config: &str, region: &str) -> Result<Arc<dyn LambdaApi>, ExternalError>;
}

type CacheKey = (String, String, String);

pub struct SdkServiceFactory {
    objects: Arc<dyn ObjectStore>,
    secrets: Arc<dyn SecretStore>,
    cache: Mutex<HashMap<CacheKey, SdkConfig>>,
}

impl std::fmt::Debug for SdkServiceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkServiceFactory").finish_non_exhaustive()
    }
}

impl SdkServiceFactory {
    pub fn new(objects: Arc<dyn ObjectStore>, secrets: Arc<dyn SecretStore>) -> Self {
        Self {
            objects,
            secrets,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Load SDK configuration for a resource.
    ///
    /// A missing `default` ProviderConfig falls back to the ambient credential
    /// chain (IRSA on EKS); any other missing ProviderConfig is an error.
    pub async fn sdk_config(&self, provider_config: &str, region: &str) -> Result<SdkConfig, ExternalError> {
        let pc: Option<ProviderConfig> = get_typed(self.objects.as_ref(), provider_config).await?;
        let pc = match pc {
            Some(pc) => Some(pc),
            None if provider_config == crate::constants::DEFAULT_PROVIDER_CONFIG_NAME => None,
            None => {
                return Err(ExternalError::validation(format!(
                    "ProviderConfig {provider_config} not found"
                )))
            }
        };

        let region = match (region, pc.as_ref().and_then(|p| p.spec.region.as_deref())) {
            (r, _) if !r.is_empty() => r.to_string(),
            (_, Some(r)) => r.to_string(),
            _ => {
                return Err(ExternalError::validation(
                    "no region set on the resource or its ProviderConfig",
                ))
            }
        };

        let version = pc
            .as_ref()
            .and_then(|p| p.metadata.resource_version.clone())
            .unwrap_or_default();
        let key = (provider_config.to_string(), version, region.clone());
        if let Some(config) = self.cached(&key) {
            return Ok(config);
        }

        let loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region.clone()));
        let loader = match pc.as_ref().map(|p| &p.spec.credentials) {
            Some(creds) if creds.source == CredentialsSource::Secret => {
                let secret_ref = creds.secret_ref.as_ref().ok_or_else(|| {
                    ExternalError::validation(format!(
                        "ProviderConfig {provider_config} uses Secret credentials without secretRef"
                    ))
                })?;
                let credentials = self
                    .static_credentials(&secret_ref.namespace, &secret_ref.name)
                    .await?;
                info!(provider_config, region = %region, "Using static credentials from secret");
                loader.credentials_provider(credentials)
            }
            Some(creds) => {
                if let Some(role_arn) = &creds.role_arn {
                    info!(
                        provider_config,
                        role_arn = %role_arn,
                        "IRSA authentication: ensure the service account carries eks.amazonaws.com/role-arn"
                    );
                }
                loader
            }
            None => {
                debug!(provider_config, "No ProviderConfig found, using the default credential chain");
                loader
            }
        };

        let config = loader.load().await;
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, config.clone());
        }
        Ok(config)
    }

    fn cached(&self, key: &CacheKey) -> Option<SdkConfig> {
        self.cache.lock().ok().and_then(|c| c.get(key).cloned())
    }

    async fn static_credentials(&self, namespace: &str, name: &str) -> Result<Credentials, ExternalError> {
        let secret_err = |message: &str| ExternalError::Secret {
            namespace: namespace.to_string(),
            name: name.to_string(),
            message: message.to_string(),
        };
        let data = self
            .secrets
            .get(namespace, name)
            .await?
            .ok_or_else(|| secret_err("credentials secret not found"))?;
        let read = |key: &str| {
            data.get(key)
                .and_then(|v| String::from_utf8(v.clone()).ok())
                .filter(|v| !v.is_empty())
        };
        let access_key = read(KEY_ACCESS_KEY_ID).ok_or_else(|| secret_err("missing aws_access_key_id"))?;
        let secret_key =
            read(KEY_SECRET_ACCESS_KEY).ok_or_else(|| secret_err("missing aws_secret_access_key"))?;
        Ok(Credentials::new(
            access_key,
            secret_key,
            read(KEY_SESSION_TOKEN),
            None,
            "ProviderConfig",
        ))
    }
}

#[async_trait]
impl ServiceFactory for SdkServiceFactory {
    async fn rds(&self, provider_config: &str, region: &str) -> Result<Arc<dyn RdsApi>, ExternalError> {
        Ok(Arc::new(SdkRds::new(&self.sdk_config(provider_config, region).await?)))
    }

    async fn batch(&self, provider_config: &str, region: &str) -> Result<Arc<dyn BatchApi>, ExternalError> {
        Ok(Arc::new(SdkBatch::new(&self.sdk_config(provider_config, region).await?)))
    }

    async fn dynamodb(&self, provider_config: &str, region: &str) -> Result<Arc<dyn DynamoDbApi>, ExternalError> {
        Ok(Arc::new(SdkDynamoDb::new(
            &self.sdk_config(provider_config, region).await?,
        )))
    }

    async fn lambda(&self, provider_config: &str, region: &str) -> Result<Arc<dyn LambdaApi>, ExternalError> {
        Ok(Arc::new(SdkLambda::new(&self.sdk_config(provider_config, region).await?)))
    }
}
