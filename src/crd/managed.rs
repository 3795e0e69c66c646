//! # Managed Resource Trait
//!
//! Every reconciled kind implements [`Managed`], which gives the generic
//! reconciler uniform access to lifecycle fields, desired parameters and the
//! observed status without knowing the concrete CRD type.

use crate::crd::common::{Condition, ConditionType, ManagedStatus, ResourceSpec};
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;

pub trait Managed:
    Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Desired parameters (`spec.forProvider`)
    type Parameters: Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync;
    /// Observed snapshot (`status.atProvider`)
    type Observation: Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync;

    fn resource_spec(&self) -> &ResourceSpec;
    fn for_provider(&self) -> &Self::Parameters;
    fn for_provider_mut(&mut self) -> &mut Self::Parameters;
    fn managed_status(&self) -> Option<&ManagedStatus<Self::Observation>>;
    fn managed_status_mut(&mut self) -> &mut ManagedStatus<Self::Observation>;

    fn kind_name() -> String {
        Self::kind(&()).to_string()
    }

    fn resource_name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    fn condition(&self, ct: ConditionType) -> Option<&Condition> {
        self.managed_status().and_then(|s| s.condition(ct))
    }

    fn set_condition(&mut self, condition: Condition) {
        self.managed_status_mut().set_condition(condition);
    }

    fn at_provider(&self) -> Option<&Self::Observation> {
        self.managed_status().and_then(|s| s.at_provider.as_ref())
    }

    fn set_at_provider(&mut self, observation: Self::Observation) {
        self.managed_status_mut().at_provider = Some(observation);
    }
}

/// Implement [`Managed`] for a CRD whose spec has `resource_spec` and
/// `for_provider` fields and whose status is a `ManagedStatus`
macro_rules! managed_resource {
    ($kind:ty, $params:ty, $obs:ty) => {
        impl $crate::crd::Managed for $kind {
            type Parameters = $params;
            type Observation = $obs;

            fn resource_spec(&self) -> &$crate::crd::ResourceSpec {
                &self.spec.resource_spec
            }

            fn for_provider(&self) -> &$params {
                &self.spec.for_provider
            }

            fn for_provider_mut(&mut self) -> &mut $params {
                &mut self.spec.for_provider
            }

            fn managed_status(&self) -> Option<&$crate::crd::ManagedStatus<$obs>> {
                self.status.as_ref()
            }

            fn managed_status_mut(&mut self) -> &mut $crate::crd::ManagedStatus<$obs> {
                self.status.get_or_insert_with(Default::default)
            }
        }
    };
}

pub(crate) use managed_resource;
