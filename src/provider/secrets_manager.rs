//! # AWS Secrets Manager Mirror
//!
//! Optional second [`ConnectionPublisher`] that mirrors connection details
//! into AWS Secrets Manager as a JSON document named
//! `<prefix>/<kind>/<name>`, for consumers outside the cluster.
//!
//! Values are merged like the Kubernetes secret publisher: keys already in
//! the document are kept unless the new details overwrite them, and an
//! unchanged document is not rewritten (each write creates a new secret
//! version).

use crate::managed::external::{ConnectionDetails, ExternalError};
use crate::managed::publisher::{ConnectionPublisher, PublishTarget};
use crate::provider::{timed, AwsError};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_secretsmanager::Client as SecretsManagerClient;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, info_span, Instrument};

const SERVICE: &str = "secretsmanager";

/// The Secrets Manager calls the mirror needs
#[async_trait]
pub trait SecretsManagerApi: Send + Sync {
    /// `NotFound` when the secret does not exist
    async fn get_secret_string(&self, name: &str) -> Result<Option<String>, AwsError>;
    async fn create_secret(&self, name: &str, value: &str) -> Result<(), AwsError>;
    async fn put_secret_value(&self, name: &str, value: &str) -> Result<(), AwsError>;
    /// Deletes without a recovery window
    async fn delete_secret(&self, name: &str) -> Result<(), AwsError>;
}

pub struct SdkSecretsManager {
    client: SecretsManagerClient,
    region: String,
}

impl std::fmt::Debug for SdkSecretsManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkSecretsManager")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SdkSecretsManager {
    /// Build a client on the default credential chain (IRSA on EKS)
    pub async fn new(region: &str) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .load()
            .await;
        Self::from_config(&sdk_config)
    }

    pub fn from_config(config: &SdkConfig) -> Self {
        Self {
            client: SecretsManagerClient::new(config),
            region: config
                .region()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl SecretsManagerApi for SdkSecretsManager {
    async fn get_secret_string(&self, name: &str) -> Result<Option<String>, AwsError> {
        let span = info_span!("aws.secretsmanager.get_secret_value", secret.name = name, region = %self.region);
        let out = timed(
            SERVICE,
            "GetSecretValue",
            self.client.get_secret_value().secret_id(name).send(),
        )
        .instrument(span)
        .await?;
        Ok(out.secret_string().map(ToString::to_string))
    }

    async fn create_secret(&self, name: &str, value: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.secretsmanager.create_secret", secret.name = name, region = %self.region);
        info!("Creating AWS secret: {}", name);
        timed(
            SERVICE,
            "CreateSecret",
            self.client
                .create_secret()
                .name(name)
                .secret_string(value)
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn put_secret_value(&self, name: &str, value: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.secretsmanager.put_secret_value", secret.name = name, region = %self.region);
        info!("Updating AWS secret: {}", name);
        timed(
            SERVICE,
            "PutSecretValue",
            self.client
                .put_secret_value()
                .secret_id(name)
                .secret_string(value)
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }

    async fn delete_secret(&self, name: &str) -> Result<(), AwsError> {
        let span = info_span!("aws.secretsmanager.delete_secret", secret.name = name, region = %self.region);
        info!("Deleting AWS secret: {}", name);
        timed(
            SERVICE,
            "DeleteSecret",
            self.client
                .delete_secret()
                .secret_id(name)
                .force_delete_without_recovery(true)
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }
}

/// Mirrors connection details into Secrets Manager
pub struct SecretsManagerPublisher {
    api: Arc<dyn SecretsManagerApi>,
    prefix: String,
}

impl std::fmt::Debug for SecretsManagerPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretsManagerPublisher")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl SecretsManagerPublisher {
    pub fn new(api: Arc<dyn SecretsManagerApi>, prefix: impl Into<String>) -> Self {
        Self {
            api,
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn secret_name(&self, target: &PublishTarget) -> String {
        format!(
            "{}/{}/{}",
            self.prefix.trim_end_matches('/'),
            target.kind.to_lowercase(),
            target.name
        )
    }
}

fn merged_document(current: Option<&str>, details: &ConnectionDetails) -> Result<String, ExternalError> {
    let mut doc: BTreeMap<String, String> = match current {
        Some(s) if !s.is_empty() => serde_json::from_str(s).unwrap_or_default(),
        _ => BTreeMap::new(),
    };
    for (k, v) in details {
        doc.insert(k.clone(), String::from_utf8_lossy(v).into_owned());
    }
    Ok(serde_json::to_string(&doc)?)
}

#[async_trait]
impl ConnectionPublisher for SecretsManagerPublisher {
    async fn publish(&self, target: &PublishTarget, details: &ConnectionDetails) -> Result<(), ExternalError> {
        if details.is_empty() {
            return Ok(());
        }
        let name = self.secret_name(target);
        let current = match self.api.get_secret_string(&name).await {
            Ok(current) => Some(current),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };

        match current {
            None => {
                let doc = merged_document(None, details)?;
                self.api.create_secret(&name, &doc).await?;
            }
            Some(current) => {
                let doc = merged_document(current.as_deref(), details)?;
                if current.as_deref() == Some(doc.as_str()) {
                    debug!("AWS secret {} unchanged, skipping update", name);
                    return Ok(());
                }
                self.api.put_secret_value(&name, &doc).await?;
            }
        }
        Ok(())
    }

    async fn unpublish(&self, target: &PublishTarget) -> Result<(), ExternalError> {
        let name = self.secret_name(target);
        match self.api.delete_secret(&name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
