//! # Custom Resource Definitions
//!
//! CRD types served by the AWS resource controller.
//!
//! ## Module Structure
//!
//! - `common.rs` - lifecycle spec, status conditions, references, tags
//! - `managed.rs` - the [`Managed`] trait every reconciled kind implements
//! - `rds.rs` - DBInstance, DBCluster and the parameter group kinds
//! - `batch.rs` - ComputeEnvironment, JobQueue, JobDefinition, Job
//! - `dynamodb.rs` - Table, Backup, GlobalTable
//! - `lambda.rs` - Permission
//! - `provider_config.rs` - region and credentials profile

pub mod batch;
pub mod common;
pub mod dynamodb;
pub mod lambda;
mod managed;
pub mod provider_config;
pub mod rds;

pub use batch::{ComputeEnvironment, Job, JobDefinition, JobQueue};
pub use common::{
    Condition, ConditionStatus, ConditionType, DeletionPolicy, ManagedStatus, ManagementPolicy,
    ProviderConfigReference, Reference, ReferencePolicy, ResolutionPolicy, ResourceSpec,
    SecretKeySelector, SecretReference, Selector, Tag,
};
pub use dynamodb::{Backup, GlobalTable, Table};
pub use lambda::Permission;
pub use managed::Managed;
pub use provider_config::{CredentialsSource, ProviderConfig, ProviderCredentials};
pub use rds::{DBCluster, DBClusterParameterGroup, DBInstance, DBParameterGroup};
