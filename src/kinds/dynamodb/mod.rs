//! # DynamoDB Adapters
//!
//! - `table.rs` - `Table`
//! - `backup.rs` - `Backup` (on-demand backups of a `Table`)
//! - `global_table.rs` - `GlobalTable` (version 2017.11.29 replica groups)

pub mod backup;
pub mod global_table;
pub mod table;

pub use backup::BackupHooks;
pub use global_table::GlobalTableHooks;
pub use table::TableHooks;

use crate::crd::{Condition, Tag};
use crate::managed::conditions;
use crate::managed::tags::diff_tags;
use crate::provider::dynamodb::DynamoDbApi;
use crate::provider::AwsError;

/// `Ready` for a table or global table status
#[must_use]
pub fn status_condition(status: Option<&str>) -> Condition {
    match status.unwrap_or_default() {
        "ACTIVE" | "UPDATING" => conditions::available(),
        "CREATING" => conditions::creating(),
        "DELETING" => conditions::deleting(),
        "" => conditions::unavailable("status not reported"),
        other => conditions::unavailable(other),
    }
}

pub(crate) async fn sync_tags(
    dynamodb: &dyn DynamoDbApi,
    arn: &str,
    desired: &[Tag],
    observed: &[Tag],
) -> Result<(), AwsError> {
    let diff = diff_tags(desired, observed);
    let stale: Vec<String> = diff
        .remove
        .into_iter()
        .filter(|k| !diff.add.iter().any(|t| &t.key == k))
        .collect();
    if !stale.is_empty() {
        dynamodb.untag_resource(arn, &stale).await?;
    }
    if !diff.add.is_empty() {
        dynamodb.tag_resource(arn, &diff.add).await?;
    }
    Ok(())
}
