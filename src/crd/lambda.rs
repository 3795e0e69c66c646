//! # Lambda Custom Resources

use crate::crd::common::{ManagedStatus, Reference, ResourceSpec, Selector};
use crate::crd::managed::managed_resource;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A statement in a Lambda function's resource-based policy.
///
/// The external name is the statement ID, derived on first reconcile from
/// the resource name and a hash of `forProvider`.
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "lambda.aws.octopilot.io",
    version = "v1alpha1",
    kind = "Permission",
    status = "PermissionStatus",
    category = "aws",
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Synced", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Synced\")].status"}, {"name":"Function", "type":"string", "jsonPath":".spec.forProvider.functionName"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct PermissionSpec {
    #[serde(flatten)]
    pub resource_spec: ResourceSpec,
    pub for_provider: PermissionParameters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionParameters {
    pub region: String,
    /// e.g. `lambda:InvokeFunction`
    pub action: String,
    /// Service principal (`s3.amazonaws.com`) or account ID / ARN
    pub principal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name_ref: Option<Reference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_name_selector: Option<Selector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal_org_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_source_token: Option<String>,
    /// Function version or alias the policy applies to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qualifier: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PermissionObservation {
    /// The statement as AWS stored it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statement: Option<String>,
}

pub type PermissionStatus = ManagedStatus<PermissionObservation>;

managed_resource!(Permission, PermissionParameters, PermissionObservation);
