//! # Managed Resource Metadata
//!
//! Finalizer, external-name and create-bookkeeping annotations.

use crate::constants::{
    ANNOTATION_EXTERNAL_CREATE_FAILED, ANNOTATION_EXTERNAL_CREATE_PENDING,
    ANNOTATION_EXTERNAL_CREATE_SUCCEEDED, ANNOTATION_EXTERNAL_NAME, FINALIZER,
};
use crate::crd::Managed;
use chrono::{DateTime, SecondsFormat, Utc};
use kube::Resource;
use sha2::{Digest, Sha256};
use std::time::Duration;

pub fn annotation<'a, K: Resource>(obj: &'a K, key: &str) -> Option<&'a str> {
    obj.meta()
        .annotations
        .as_ref()
        .and_then(|a| a.get(key))
        .map(String::as_str)
}

/// Set an annotation; returns whether the value changed
pub fn set_annotation<K: Resource>(obj: &mut K, key: &str, value: &str) -> bool {
    let annotations = obj.meta_mut().annotations.get_or_insert_with(Default::default);
    if annotations.get(key).map(String::as_str) == Some(value) {
        return false;
    }
    annotations.insert(key.to_string(), value.to_string());
    true
}

/// The AWS identifier, when one has been assigned
pub fn external_name<K: Resource>(obj: &K) -> Option<&str> {
    annotation(obj, ANNOTATION_EXTERNAL_NAME).filter(|n| !n.is_empty())
}

pub fn set_external_name<K: Resource>(obj: &mut K, name: &str) -> bool {
    set_annotation(obj, ANNOTATION_EXTERNAL_NAME, name)
}

pub fn has_finalizer<K: Resource>(obj: &K) -> bool {
    obj.meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == FINALIZER))
}

/// Returns whether the finalizer was added
pub fn add_finalizer<K: Resource>(obj: &mut K) -> bool {
    if has_finalizer(obj) {
        return false;
    }
    obj.meta_mut()
        .finalizers
        .get_or_insert_with(Vec::new)
        .push(FINALIZER.to_string());
    true
}

/// Returns whether the finalizer was removed
pub fn remove_finalizer<K: Resource>(obj: &mut K) -> bool {
    let Some(finalizers) = obj.meta_mut().finalizers.as_mut() else {
        return false;
    };
    let before = finalizers.len();
    finalizers.retain(|f| f != FINALIZER);
    before != finalizers.len()
}

pub fn is_being_deleted<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

/// UID of the controlling owner reference
pub fn controller_uid<K: Resource>(obj: &K) -> Option<&str> {
    obj.meta()
        .owner_references
        .as_ref()?
        .iter()
        .find(|o| o.controller == Some(true))
        .map(|o| o.uid.as_str())
}

fn timestamp(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn annotation_time<K: Resource>(obj: &K, key: &str) -> Option<DateTime<Utc>> {
    annotation(obj, key)
        .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
        .map(|t| t.with_timezone(&Utc))
}

pub fn set_create_pending<K: Resource>(obj: &mut K, now: DateTime<Utc>) {
    set_annotation(obj, ANNOTATION_EXTERNAL_CREATE_PENDING, &timestamp(now));
}

pub fn set_create_succeeded<K: Resource>(obj: &mut K, now: DateTime<Utc>) {
    set_annotation(obj, ANNOTATION_EXTERNAL_CREATE_SUCCEEDED, &timestamp(now));
}

pub fn set_create_failed<K: Resource>(obj: &mut K, now: DateTime<Utc>) {
    set_annotation(obj, ANNOTATION_EXTERNAL_CREATE_FAILED, &timestamp(now));
}

/// What the create annotations say about issuing another Create
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateGuard {
    Proceed,
    /// A Create was recorded as pending with no recorded outcome; it may
    /// have produced a resource we do not know the name of
    Incomplete,
    /// A Create succeeded recently; the resource is probably not visible yet
    WithinGracePeriod,
}

pub fn create_guard<K: Resource>(obj: &K, now: DateTime<Utc>, grace: Duration) -> CreateGuard {
    let pending = annotation_time(obj, ANNOTATION_EXTERNAL_CREATE_PENDING);
    let succeeded = annotation_time(obj, ANNOTATION_EXTERNAL_CREATE_SUCCEEDED);
    let failed = annotation_time(obj, ANNOTATION_EXTERNAL_CREATE_FAILED);

    if let Some(pending) = pending {
        let outcome = succeeded.max(failed);
        if outcome.is_none_or_before(pending) {
            return CreateGuard::Incomplete;
        }
    }
    if let Some(succeeded) = succeeded {
        let grace = chrono::Duration::from_std(grace).unwrap_or_else(|_| chrono::Duration::zero());
        if now < succeeded + grace {
            return CreateGuard::WithinGracePeriod;
        }
    }
    CreateGuard::Proceed
}

trait OutcomeExt {
    fn is_none_or_before(&self, t: DateTime<Utc>) -> bool;
}

impl OutcomeExt for Option<DateTime<Utc>> {
    fn is_none_or_before(&self, t: DateTime<Utc>) -> bool {
        self.map_or(true, |o| o < t)
    }
}

/// How the external name of a new resource is chosen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExternalNameInitializer {
    /// Use `metadata.name`
    #[default]
    ResourceName,
    /// `<metadata.name>-<first 16 hex chars of sha256(forProvider)>`
    SpecHash,
    /// Assigned by the adapter from the Create response
    Deferred,
}

impl ExternalNameInitializer {
    /// Assign an external name if none is set; returns whether one was assigned
    pub fn initialize<R: Managed>(self, cr: &mut R) -> Result<bool, serde_json::Error> {
        if external_name(cr).is_some() {
            return Ok(false);
        }
        let name = match self {
            Self::ResourceName => cr.resource_name().to_string(),
            Self::SpecHash => {
                let spec = serde_json::to_vec(cr.for_provider())?;
                let digest = hex::encode(Sha256::digest(&spec));
                format!("{}-{}", cr.resource_name(), &digest[..16])
            }
            Self::Deferred => return Ok(false),
        };
        Ok(set_external_name(cr, &name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::dynamodb::{Table, TableSpec};

    fn table() -> Table {
        Table::new(
            "orders",
            TableSpec {
                resource_spec: Default::default(),
                for_provider: Default::default(),
            },
        )
    }

    #[test]
    fn test_finalizer_add_remove() {
        let mut t = table();
        assert!(add_finalizer(&mut t));
        assert!(!add_finalizer(&mut t));
        assert!(has_finalizer(&t));
        assert!(remove_finalizer(&mut t));
        assert!(!has_finalizer(&t));
    }

    #[test]
    fn test_external_name_initializers() {
        let mut t = table();
        assert!(ExternalNameInitializer::ResourceName.initialize(&mut t).unwrap());
        assert_eq!(external_name(&t), Some("orders"));
        // Immutable once set
        t.metadata.name = Some("renamed".to_string());
        assert!(!ExternalNameInitializer::ResourceName.initialize(&mut t).unwrap());
        assert_eq!(external_name(&t), Some("orders"));

        let mut t = table();
        ExternalNameInitializer::SpecHash.initialize(&mut t).unwrap();
        let name = external_name(&t).unwrap();
        assert!(name.starts_with("orders-"));
        assert_eq!(name.len(), "orders-".len() + 16);

        let mut t = table();
        assert!(!ExternalNameInitializer::Deferred.initialize(&mut t).unwrap());
        assert_eq!(external_name(&t), None);
    }

    #[test]
    fn test_create_guard() {
        let now = Utc::now();
        let grace = Duration::from_secs(60);
        let mut t = table();
        assert_eq!(create_guard(&t, now, grace), CreateGuard::Proceed);

        set_create_pending(&mut t, now - chrono::Duration::seconds(10));
        assert_eq!(create_guard(&t, now, grace), CreateGuard::Incomplete);

        set_create_succeeded(&mut t, now - chrono::Duration::seconds(9));
        assert_eq!(create_guard(&t, now, grace), CreateGuard::WithinGracePeriod);
        assert_eq!(
            create_guard(&t, now + chrono::Duration::seconds(120), grace),
            CreateGuard::Proceed
        );

        let mut t = table();
        set_create_pending(&mut t, now - chrono::Duration::seconds(10));
        set_create_failed(&mut t, now - chrono::Duration::seconds(9));
        assert_eq!(create_guard(&t, now, grace), CreateGuard::Proceed);
    }
}
