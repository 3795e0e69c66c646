//! # Parameter Group Adapter
//!
//! One adapter serves both `DBParameterGroup` and `DBClusterParameterGroup`;
//! [`ParameterGroupResource::KIND`] selects the RDS API family.
//!
//! Only parameters whose source is `user` are compared. AWS accepts at most
//! [`MAX_PARAMETERS_PER_REQUEST`] parameters per Modify or Reset call, so a
//! large change converges over several reconciles.

use super::{sync_tags, user_tags};
use crate::constants::MAX_PARAMETERS_PER_REQUEST;
use crate::crd::rds::{Parameter, ParameterGroupObservation, ParameterGroupParameters};
use crate::crd::{DBClusterParameterGroup, DBParameterGroup, Managed, Tag};
use crate::kinds::{BuildHooks, ConnectContext};
use crate::managed::external::{ExternalCreation, ExternalError, ExternalUpdate, KindHooks};
use crate::managed::meta;
use crate::managed::pointer::LateInitializer;
use crate::managed::tags::{are_tags_up_to_date, duplicate_key};
use crate::managed::ResolveReferences;
use crate::provider::rds::{ObservedParameter, ParameterGroup, ParameterGroupKind, RdsApi};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, info};

const SOURCE_USER: &str = "user";

/// A kind reconciled by [`ParameterGroupHooks`]
pub trait ParameterGroupResource:
    Managed<Parameters = ParameterGroupParameters, Observation = ParameterGroupObservation>
    + ResolveReferences
{
    const KIND: ParameterGroupKind;
}

impl ParameterGroupResource for DBParameterGroup {
    const KIND: ParameterGroupKind = ParameterGroupKind::Instance;
}

impl ParameterGroupResource for DBClusterParameterGroup {
    const KIND: ParameterGroupKind = ParameterGroupKind::Cluster;
}

impl ResolveReferences for DBParameterGroup {}

impl ResolveReferences for DBClusterParameterGroup {}

/// Group metadata plus its user-set parameters and tags
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterGroupState {
    pub group: ParameterGroup,
    pub parameters: Vec<ObservedParameter>,
    pub tags: Vec<Tag>,
}

/// Pending work for one Update pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ParameterDiff {
    /// Desired parameters AWS does not hold with the desired value
    pub modify: Vec<Parameter>,
    /// User-set parameters no longer desired
    pub reset: Vec<String>,
}

impl ParameterDiff {
    pub fn is_empty(&self) -> bool {
        self.modify.is_empty() && self.reset.is_empty()
    }
}

pub fn diff_parameters(desired: &[Parameter], observed: &[ObservedParameter]) -> ParameterDiff {
    let current: BTreeMap<&str, Option<&str>> = observed
        .iter()
        .filter(|p| p.source.as_deref().map_or(true, |s| s == SOURCE_USER))
        .map(|p| (p.name.as_str(), p.value.as_deref()))
        .collect();

    let modify = desired
        .iter()
        .filter(|p| current.get(p.parameter_name.as_str()) != Some(&p.parameter_value.as_deref()))
        .cloned()
        .collect();
    let reset = current
        .keys()
        .filter(|name| !desired.iter().any(|p| p.parameter_name == **name))
        .map(|name| (*name).to_string())
        .collect();
    ParameterDiff { modify, reset }
}

pub struct ParameterGroupHooks<R> {
    rds: Arc<dyn RdsApi>,
    _kind: PhantomData<fn() -> R>,
}

impl<R> std::fmt::Debug for ParameterGroupHooks<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterGroupHooks")
            .field("kind", &std::any::type_name::<R>())
            .finish_non_exhaustive()
    }
}

impl<R> ParameterGroupHooks<R> {
    pub fn new(rds: Arc<dyn RdsApi>) -> Self {
        Self {
            rds,
            _kind: PhantomData,
        }
    }
}

fn group_name<R: Managed>(cr: &R) -> Result<String, ExternalError> {
    meta::external_name(cr)
        .map(ToString::to_string)
        .ok_or_else(|| ExternalError::validation("external name is not set"))
}

impl<R: ParameterGroupResource> ParameterGroupHooks<R> {
    async fn family(&self, params: &ParameterGroupParameters) -> Result<String, ExternalError> {
        if let Some(family) = params.family.as_ref().filter(|f| !f.is_empty()) {
            return Ok(family.clone());
        }
        let Some(selector) = &params.family_configuration else {
            return Err(ExternalError::validation(
                "either family or familyConfiguration must be set",
            ));
        };
        self.rds
            .default_family(&selector.engine, selector.engine_version.as_deref())
            .await?
            .ok_or_else(|| {
                ExternalError::validation(format!(
                    "no parameter group family for engine {} version {}",
                    selector.engine,
                    selector.engine_version.as_deref().unwrap_or("default")
                ))
            })
    }
}

#[async_trait]
impl<R: ParameterGroupResource> KindHooks for ParameterGroupHooks<R> {
    type Resource = R;
    type Described = ParameterGroupState;

    fn validate(&self, cr: &R) -> Result<(), ExternalError> {
        // AWS reports no value for a parameter left at its default, so a
        // valueless desired parameter would be modified on every pass
        if let Some(p) = cr.for_provider().parameters.iter().find(|p| p.parameter_value.is_none()) {
            return Err(ExternalError::validation(format!(
                "parameter {} has no parameterValue",
                p.parameter_name
            )));
        }
        if let Some(key) = duplicate_key(&cr.for_provider().tags) {
            return Err(ExternalError::validation(format!("duplicate tag key {key}")));
        }
        Ok(())
    }

    async fn describe(&self, cr: &R) -> Result<Vec<ParameterGroupState>, ExternalError> {
        let Some(name) = meta::external_name(cr) else {
            return Ok(Vec::new());
        };
        let group = self.rds.describe_parameter_group(R::KIND, name).await?;
        let parameters = self
            .rds
            .describe_parameters(R::KIND, name, Some(SOURCE_USER))
            .await?;
        let tags = match group.arn.as_deref() {
            Some(arn) => self.rds.list_tags(arn).await?,
            None => Vec::new(),
        };
        Ok(vec![ParameterGroupState {
            group,
            parameters,
            tags,
        }])
    }

    fn generate_observation(&self, state: &ParameterGroupState) -> ParameterGroupObservation {
        ParameterGroupObservation {
            arn: state.group.arn.clone(),
            family: state.group.family.clone(),
        }
    }

    fn late_initialize(&self, cr: &R, state: &ParameterGroupState) -> Option<ParameterGroupParameters> {
        let mut p = cr.for_provider().clone();
        let mut li = LateInitializer::new();
        li.option(&mut p.family, state.group.family.clone());
        li.option(&mut p.description, state.group.description.clone());
        li.is_changed().then_some(p)
    }

    async fn is_up_to_date(&self, cr: &R, state: &ParameterGroupState) -> Result<bool, ExternalError> {
        let p = cr.for_provider();
        let diff = diff_parameters(&p.parameters, &state.parameters);
        if !diff.is_empty() {
            debug!(
                "{} {}: {} parameters to modify, {} to reset",
                R::kind_name(),
                cr.resource_name(),
                diff.modify.len(),
                diff.reset.len()
            );
            return Ok(false);
        }
        Ok(are_tags_up_to_date(&p.tags, &user_tags(&state.tags)))
    }

    async fn create_remote(&self, cr: &mut R) -> Result<ExternalCreation, ExternalError> {
        let name = group_name(cr)?;
        let params = cr.for_provider().clone();
        let family = self.family(&params).await?;
        let description = params
            .description
            .clone()
            .unwrap_or_else(|| format!("{name} parameter group"));

        info!("Creating {} {} (family {})", R::kind_name(), name, family);
        let group = self
            .rds
            .create_parameter_group(R::KIND, &name, &family, &description, &params.tags)
            .await?;
        cr.set_at_provider(ParameterGroupObservation {
            arn: group.arn,
            family: Some(family),
        });
        Ok(ExternalCreation::default())
    }

    async fn update_remote(&self, cr: &mut R) -> Result<ExternalUpdate, ExternalError> {
        let name = group_name(cr)?;
        let desired = cr.for_provider().clone();
        let observed = self
            .rds
            .describe_parameters(R::KIND, &name, Some(SOURCE_USER))
            .await?;
        let diff = diff_parameters(&desired.parameters, &observed);

        if !diff.modify.is_empty() {
            let batch = &diff.modify[..diff.modify.len().min(MAX_PARAMETERS_PER_REQUEST)];
            info!(
                "Modifying {} of {} parameters in {}",
                batch.len(),
                diff.modify.len(),
                name
            );
            self.rds.modify_parameters(R::KIND, &name, batch).await?;
        }
        if !diff.reset.is_empty() {
            let batch = &diff.reset[..diff.reset.len().min(MAX_PARAMETERS_PER_REQUEST)];
            info!("Resetting {} parameters in {}", batch.len(), name);
            self.rds.reset_parameters(R::KIND, &name, batch).await?;
        }

        let arn = cr.at_provider().and_then(|o| o.arn.clone());
        if let Some(arn) = arn {
            let current = self.rds.list_tags(&arn).await?;
            sync_tags(self.rds.as_ref(), &arn, &desired.tags, &current).await?;
        }
        Ok(ExternalUpdate::default())
    }

    async fn delete_remote(&self, cr: &mut R) -> Result<(), ExternalError> {
        let name = group_name(cr)?;
        info!("Deleting {} {}", R::kind_name(), name);
        Ok(self.rds.delete_parameter_group(R::KIND, &name).await?)
    }
}

#[async_trait]
impl<R: ParameterGroupResource> BuildHooks for ParameterGroupHooks<R> {
    async fn build(ctx: &ConnectContext, cr: &R) -> Result<Self, ExternalError> {
        let rds = ctx.rds(cr, &cr.for_provider().region).await?;
        Ok(Self::new(rds))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desired(name: &str, value: &str) -> Parameter {
        Parameter {
            parameter_name: name.to_string(),
            parameter_value: Some(value.to_string()),
            apply_method: Some("immediate".to_string()),
        }
    }

    fn current(name: &str, value: &str) -> ObservedParameter {
        ObservedParameter {
            name: name.to_string(),
            value: Some(value.to_string()),
            apply_method: Some("immediate".to_string()),
            source: Some(SOURCE_USER.to_string()),
        }
    }

    #[test]
    fn test_diff_modifies_changed_and_missing() {
        let diff = diff_parameters(
            &[desired("max_connections", "200"), desired("work_mem", "8192")],
            &[current("max_connections", "100")],
        );
        assert_eq!(diff.modify.len(), 2);
        assert!(diff.reset.is_empty());
    }

    #[test]
    fn test_diff_resets_removed_user_parameters() {
        let diff = diff_parameters(
            &[desired("max_connections", "100")],
            &[current("max_connections", "100"), current("work_mem", "8192")],
        );
        assert!(diff.modify.is_empty());
        assert_eq!(diff.reset, vec!["work_mem".to_string()]);
    }

    #[test]
    fn test_diff_ignores_engine_defaults() {
        let mut engine_default = current("shared_buffers", "128");
        engine_default.source = Some("engine-default".to_string());
        let diff = diff_parameters(&[], &[engine_default]);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_matching_parameters_are_up_to_date() {
        let diff = diff_parameters(&[desired("a", "1")], &[current("a", "1")]);
        assert!(diff.is_empty());
    }
}
