//! # Provider Configuration
//!
//! Cluster-scoped `ProviderConfig` naming the default region and how AWS
//! credentials are obtained. Managed resources select one through
//! `spec.providerConfigRef`.

use crate::crd::common::SecretReference;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "aws.octopilot.io",
    version = "v1alpha1",
    kind = "ProviderConfig",
    category = "aws"
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    /// Region used when a resource does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub credentials: ProviderCredentials,
}

/// Where AWS credentials come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum CredentialsSource {
    /// Default credential chain; on EKS this picks up IRSA from the pod's
    /// service account
    #[default]
    Irsa,
    /// Static access keys read from a Kubernetes secret
    Secret,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderCredentials {
    #[serde(default)]
    pub source: CredentialsSource,
    /// Secret with `aws_access_key_id`, `aws_secret_access_key` and optionally
    /// `aws_session_token`. Required when `source` is `Secret`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretReference>,
    /// Informational role ARN for IRSA; the role actually assumed comes from
    /// the service account annotation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
}
