//! Permission adapter.
//!
//! The external name is the statement ID. Lambda cannot modify a statement
//! in place, so an update removes it and adds it again; the statement is
//! missing from the policy for the time between the two calls.

use super::policy::{find_statement, PolicyStatement, Principal};
use crate::crd::lambda::{PermissionObservation, PermissionParameters};
use crate::crd::{Managed, Permission};
use crate::kinds::{targets, BuildHooks, ConnectContext};
use crate::managed::external::{
    ExternalCreation, ExternalError, ExternalUpdate, KindHooks,
};
use crate::managed::reference::resolve_field;
use crate::managed::{
    meta, ExternalNameInitializer, Extractor, ReferenceError, ReferenceResolver, ResolveReferences,
};
use crate::provider::lambda::LambdaApi;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

pub struct PermissionHooks {
    lambda: Arc<dyn LambdaApi>,
}

impl std::fmt::Debug for PermissionHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionHooks").finish_non_exhaustive()
    }
}

impl PermissionHooks {
    pub fn new(lambda: Arc<dyn LambdaApi>) -> Self {
        Self { lambda }
    }

    async fn add(&self, cr: &mut Permission) -> Result<(), ExternalError> {
        let (function, sid) = target(cr)?;
        let statement = self
            .lambda
            .add_permission(&function, &sid, cr.for_provider())
            .await?;
        cr.set_at_provider(PermissionObservation { statement });
        Ok(())
    }
}

/// Function name and statement ID
fn target(cr: &Permission) -> Result<(String, String), ExternalError> {
    let function = cr
        .for_provider()
        .function_name
        .clone()
        .ok_or_else(|| ExternalError::validation("functionName is not set"))?;
    let sid = meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("external name is not set"))?;
    Ok((function, sid))
}

/// Whether the stored statement grants what `desired` asks for
#[must_use]
pub fn statement_up_to_date(desired: &PermissionParameters, observed: &PolicyStatement) -> bool {
    observed.action.as_deref() == Some(desired.action.as_str())
        && observed.principal.as_ref() == Some(&Principal::from_requested(&desired.principal))
        && observed.source_arn() == desired.source_arn.as_deref()
        && observed.source_account() == desired.source_account.as_deref()
        && observed.principal_org_id() == desired.principal_org_id.as_deref()
        && observed.event_source_token() == desired.event_source_token.as_deref()
}

#[async_trait]
impl KindHooks for PermissionHooks {
    type Resource = Permission;
    type Described = PolicyStatement;

    fn validate(&self, cr: &Permission) -> Result<(), ExternalError> {
        let p = cr.for_provider();
        if p.function_name.is_none() {
            return Err(ExternalError::validation("functionName is not set"));
        }
        if p.action.is_empty() {
            return Err(ExternalError::validation("action must not be empty"));
        }
        if p.principal.is_empty() {
            return Err(ExternalError::validation("principal must not be empty"));
        }
        Ok(())
    }

    async fn describe(&self, cr: &Permission) -> Result<Vec<PolicyStatement>, ExternalError> {
        let Some(sid) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        let Some(function) = cr.for_provider().function_name.as_deref() else {
            return Ok(Vec::new());
        };
        let policy = self
            .lambda
            .get_policy(function, cr.for_provider().qualifier.as_deref())
            .await?;
        Ok(find_statement(&policy, sid)?.into_iter().collect())
    }

    fn generate_observation(&self, s: &PolicyStatement) -> PermissionObservation {
        PermissionObservation {
            statement: serde_json::to_string(s).ok(),
        }
    }

    async fn is_up_to_date(&self, cr: &Permission, s: &PolicyStatement) -> Result<bool, ExternalError> {
        let up_to_date = statement_up_to_date(cr.for_provider(), s);
        if !up_to_date {
            debug!("Statement {} differs from the desired permission", s.sid);
        }
        Ok(up_to_date)
    }

    async fn create_remote(&self, cr: &mut Permission) -> Result<ExternalCreation, ExternalError> {
        self.add(cr).await?;
        Ok(ExternalCreation::default())
    }

    async fn update_remote(&self, cr: &mut Permission) -> Result<ExternalUpdate, ExternalError> {
        let (function, sid) = target(cr)?;
        info!("Replacing statement {} on function {}", sid, function);
        match self
            .lambda
            .remove_permission(&function, &sid, cr.for_provider().qualifier.as_deref())
            .await
        {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
        self.add(cr).await?;
        Ok(ExternalUpdate::default())
    }

    async fn delete_remote(&self, cr: &mut Permission) -> Result<(), ExternalError> {
        let (function, sid) = target(cr)?;
        Ok(self
            .lambda
            .remove_permission(&function, &sid, cr.for_provider().qualifier.as_deref())
            .await?)
    }
}

#[async_trait]
impl BuildHooks for PermissionHooks {
    fn external_name_initializer() -> ExternalNameInitializer {
        ExternalNameInitializer::SpecHash
    }

    async fn build(ctx: &ConnectContext, cr: &Permission) -> Result<Self, ExternalError> {
        Ok(Self::new(ctx.lambda(cr, &cr.for_provider().region).await?))
    }
}

#[async_trait]
impl ResolveReferences for Permission {
    async fn resolve_references(&mut self, resolver: &ReferenceResolver) -> Result<(), ReferenceError> {
        let from = self.metadata.clone();
        let p = &mut self.spec.for_provider;
        resolve_field(
            resolver,
            &from,
            &mut p.function_name,
            &mut p.function_name_ref,
            p.function_name_selector.as_ref(),
            &targets::lambda_function(),
            Extractor::ExternalName,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn desired() -> PermissionParameters {
        PermissionParameters {
            region: "us-east-1".to_string(),
            action: "lambda:InvokeFunction".to_string(),
            principal: "s3.amazonaws.com".to_string(),
            function_name: Some("thumbnail".to_string()),
            source_arn: Some("arn:aws:s3:::uploads".to_string()),
            ..PermissionParameters::default()
        }
    }

    fn stored() -> PolicyStatement {
        PolicyStatement {
            sid: "thumbnail-s3".to_string(),
            effect: Some("Allow".to_string()),
            action: Some("lambda:InvokeFunction".to_string()),
            resource: None,
            principal: Some(Principal::Service("s3.amazonaws.com".to_string())),
            condition: Some(BTreeMap::from([(
                "ArnLike".to_string(),
                BTreeMap::from([(
                    "AWS:SourceArn".to_string(),
                    serde_json::json!("arn:aws:s3:::uploads"),
                )]),
            )])),
        }
    }

    #[test]
    fn test_matching_statement_is_up_to_date() {
        assert!(statement_up_to_date(&desired(), &stored()));
    }

    #[test]
    fn test_source_arn_drift() {
        let mut d = desired();
        d.source_arn = Some("arn:aws:s3:::other".to_string());
        assert!(!statement_up_to_date(&d, &stored()));
        d.source_arn = None;
        assert!(!statement_up_to_date(&d, &stored()));
    }

    #[test]
    fn test_account_principal_matches_root_arn() {
        let mut d = desired();
        d.principal = "123456789012".to_string();
        d.source_arn = None;
        let mut s = stored();
        s.condition = None;
        s.principal = Some(Principal::Aws("arn:aws:iam::123456789012:root".to_string()));
        assert!(statement_up_to_date(&d, &s));
    }
}
