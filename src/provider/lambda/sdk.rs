//! `aws-sdk-lambda` implementation of [`LambdaApi`]

use super::LambdaApi;
use crate::crd::lambda::PermissionParameters;
use crate::provider::{timed, AwsError};
use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_lambda::Client;
use tracing::{info, info_span, Instrument};

const SERVICE: &str = "lambda";

pub struct SdkLambda {
    client: Client,
    region: String,
}

impl std::fmt::Debug for SdkLambda {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdkLambda")
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl SdkLambda {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: Client::new(config),
            region: config
                .region()
                .map(ToString::to_string)
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl LambdaApi for SdkLambda {
    async fn get_policy(&self, function_name: &str, qualifier: Option<&str>) -> Result<String, AwsError> {
        let span = info_span!("aws.lambda.get_policy", function = function_name, region = %self.region);
        let out = timed(
            SERVICE,
            "GetPolicy",
            self.client
                .get_policy()
                .function_name(function_name)
                .set_qualifier(qualifier.map(ToString::to_string))
                .send(),
        )
        .instrument(span)
        .await?;
        out.policy()
            .map(ToString::to_string)
            .ok_or_else(|| AwsError::not_found(format!("policy of function {function_name}")))
    }

    async fn add_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        p: &PermissionParameters,
    ) -> Result<Option<String>, AwsError> {
        let span = info_span!(
            "aws.lambda.add_permission",
            function = function_name,
            statement_id,
            region = %self.region
        );
        info!(function = function_name, statement_id, principal = %p.principal, "Adding permission");
        let out = timed(
            SERVICE,
            "AddPermission",
            self.client
                .add_permission()
                .function_name(function_name)
                .statement_id(statement_id)
                .action(&p.action)
                .principal(&p.principal)
                .set_source_arn(p.source_arn.clone())
                .set_source_account(p.source_account.clone())
                .set_principal_org_id(p.principal_org_id.clone())
                .set_event_source_token(p.event_source_token.clone())
                .set_qualifier(p.qualifier.clone())
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(out.statement().map(ToString::to_string))
    }

    async fn remove_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        qualifier: Option<&str>,
    ) -> Result<(), AwsError> {
        let span = info_span!(
            "aws.lambda.remove_permission",
            function = function_name,
            statement_id,
            region = %self.region
        );
        info!(function = function_name, statement_id, "Removing permission");
        timed(
            SERVICE,
            "RemovePermission",
            self.client
                .remove_permission()
                .function_name(function_name)
                .statement_id(statement_id)
                .set_qualifier(qualifier.map(ToString::to_string))
                .send(),
        )
        .instrument(span)
        .await?;
        Ok(())
    }
}
