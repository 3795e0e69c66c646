//! # Lambda Client
//!
//! Only resource-based policy statements are managed; the function itself is
//! not.

pub mod sdk;

use crate::crd::lambda::PermissionParameters;
use crate::provider::AwsError;
use async_trait::async_trait;

#[async_trait]
pub trait LambdaApi: Send + Sync {
    /// The function's policy document; `NotFound` when it has none
    async fn get_policy(&self, function_name: &str, qualifier: Option<&str>) -> Result<String, AwsError>;
    /// Returns the statement AWS stored
    async fn add_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        params: &PermissionParameters,
    ) -> Result<Option<String>, AwsError>;
    async fn remove_permission(
        &self,
        function_name: &str,
        statement_id: &str,
        qualifier: Option<&str>,
    ) -> Result<(), AwsError>;
}
