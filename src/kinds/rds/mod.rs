//! # RDS Adapters
//!
//! - `dbinstance.rs` - `DBInstance`
//! - `dbcluster.rs` - `DBCluster`
//! - `parameter_group.rs` - `DBParameterGroup` and `DBClusterParameterGroup`
//! - `password.rs` - master password generation and the password cache
//! - `windows.rs` - backup/maintenance window comparison
//!
//! Instances and clusters share the status mapping, engine version and
//! security group comparison below.

pub mod dbcluster;
pub mod dbinstance;
pub mod parameter_group;
pub mod password;
pub mod windows;

pub use dbcluster::DBClusterHooks;
pub use dbinstance::DBInstanceHooks;
pub use parameter_group::{ParameterGroupHooks, ParameterGroupResource};
pub use password::{generate_password, PasswordCache, PasswordSource};

use crate::crd::rds::VpcSecurityGroupMembership;
use crate::crd::{Condition, Tag};
use crate::managed::conditions;
use crate::managed::tags::diff_tags;
use crate::provider::rds::RdsApi;
use crate::provider::AwsError;
use std::collections::BTreeSet;

/// `Ready` for an instance or cluster status
#[must_use]
pub fn status_condition(status: Option<&str>) -> Condition {
    match status.unwrap_or_default() {
        "available" | "modifying" => conditions::available(),
        "creating" => conditions::creating(),
        "deleting" | "stopped" | "stopping" => conditions::deleting(),
        "" => conditions::unavailable("status not reported"),
        other => conditions::unavailable(other),
    }
}

/// Modify calls are only issued against an `available` resource; every
/// other status (`upgrading`, `modifying`, `configuring-iam-database-auth`,
/// `creating`, ...) is reported as up to date until it settles
#[must_use]
pub fn accepts_modify(status: Option<&str>) -> bool {
    status == Some("available")
}

/// A desired version matches when it is a prefix of the observed one on
/// component boundaries: `14` and `14.7` both match `14.7`, `14.1` does not
/// match `14.10`
#[must_use]
pub fn engine_version_matches(desired: &str, observed: &str) -> bool {
    let desired: Vec<&str> = desired.split('.').collect();
    let observed: Vec<&str> = observed.split('.').collect();
    desired.len() <= observed.len() && desired.iter().zip(&observed).all(|(d, o)| d == o)
}

#[must_use]
pub fn engine_version_up_to_date(desired: Option<&str>, observed: Option<&str>) -> bool {
    match (desired, observed) {
        (None, _) => true,
        (Some(d), Some(o)) => engine_version_matches(d, o),
        (Some(_), None) => false,
    }
}

/// Security groups compare as sets; an empty desired list accepts whatever
/// AWS assigned
#[must_use]
pub fn security_groups_up_to_date(desired: &[String], observed: &[VpcSecurityGroupMembership]) -> bool {
    if desired.is_empty() {
        return true;
    }
    let desired: BTreeSet<&str> = desired.iter().map(String::as_str).collect();
    let observed: BTreeSet<&str> = observed
        .iter()
        .map(|m| m.vpc_security_group_id.as_str())
        .collect();
    desired == observed
}

/// An unset desired value is satisfied by anything
pub(crate) fn field_up_to_date<T: PartialEq>(desired: Option<&T>, observed: Option<&T>) -> bool {
    desired.map_or(true, |d| observed == Some(d))
}

/// Tags AWS manages itself (`aws:` prefix) are never diffed
pub(crate) fn user_tags(tags: &[Tag]) -> Vec<Tag> {
    tags.iter()
        .filter(|t| !t.key.starts_with("aws:"))
        .cloned()
        .collect()
}

/// Bring the tags on `arn` in line with `desired`
pub(crate) async fn sync_tags(
    rds: &dyn RdsApi,
    arn: &str,
    desired: &[Tag],
    observed: &[Tag],
) -> Result<(), AwsError> {
    let diff = diff_tags(desired, &user_tags(observed));
    if !diff.remove.is_empty() {
        rds.remove_tags(arn, &diff.remove).await?;
    }
    if !diff.add.is_empty() {
        rds.add_tags(arn, &diff.add).await?;
    }
    Ok(())
}

/// Records field names that differ between desired and observed state
#[derive(Debug, Default)]
pub(crate) struct Drift(Vec<&'static str>);

impl Drift {
    pub(crate) fn check(&mut self, field: &'static str, up_to_date: bool) {
        if !up_to_date {
            self.0.push(field);
        }
    }

    pub(crate) fn fields(&self) -> &[&'static str] {
        &self.0
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
