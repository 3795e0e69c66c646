//! # Reference Resolution
//!
//! Fills `forProvider` identifier fields from other managed resources named
//! by a `*Ref` or matched by a `*Selector`.
//!
//! A field that already holds a value is never re-resolved. A reference is
//! looked up by name; a selector lists candidates by label (and optionally by
//! shared controller), picks the first by name and is turned into a
//! reference so later reconciles resolve the same target.

use crate::constants::ANNOTATION_EXTERNAL_NAME;
use crate::crd::{Reference, Selector};
use crate::store::{ObjectStore, StoreError};
use async_trait::async_trait;
use kube::api::{ApiResource, GroupVersionKind, ObjectMeta};
use kube::core::DynamicObject;
use kube::Resource;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("referenced {kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("referenced {kind} '{name}' is not ready: {field} is not set")]
    NotReady {
        kind: String,
        name: String,
        field: String,
    },

    #[error("no {kind} matches selector {selector}")]
    NoMatch { kind: String, selector: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which value of the target is copied into the referencing field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// The target's external-name annotation
    ExternalName,
    /// A string under `status.atProvider`, as a JSON pointer (`/dbInstanceArn`)
    AtProvider(&'static str),
}

impl Extractor {
    #[must_use]
    pub fn extract(self, obj: &DynamicObject) -> Option<String> {
        let value = match self {
            Extractor::ExternalName => obj
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(ANNOTATION_EXTERNAL_NAME))
                .cloned(),
            Extractor::AtProvider(pointer) => obj
                .data
                .pointer(&format!("/status/atProvider{pointer}"))
                .and_then(|v| v.as_str())
                .map(ToString::to_string),
        };
        value.filter(|v| !v.is_empty())
    }

    fn describe(self) -> String {
        match self {
            Extractor::ExternalName => format!("annotation {ANNOTATION_EXTERNAL_NAME}"),
            Extractor::AtProvider(pointer) => format!("status.atProvider{}", pointer.replace('/', ".")),
        }
    }
}

/// Kind a reference points at
#[derive(Debug, Clone)]
pub struct TargetKind {
    pub api_resource: ApiResource,
}

impl TargetKind {
    /// A kind served by this crate
    #[must_use]
    pub fn of<K: Resource<DynamicType = ()>>() -> Self {
        Self {
            api_resource: ApiResource::erase::<K>(&()),
        }
    }

    /// A kind served by a sibling controller (IAM roles, VPC subnets, ...)
    #[must_use]
    pub fn external(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            api_resource: ApiResource::from_gvk_with_plural(
                &GroupVersionKind::gvk(group, version, kind),
                plural,
            ),
        }
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.api_resource.kind
    }
}

/// Single-valued resolution request
#[derive(Debug)]
pub struct ResolutionRequest<'a> {
    pub current: Option<&'a str>,
    pub reference: Option<&'a Reference>,
    pub selector: Option<&'a Selector>,
    pub target: &'a TargetKind,
    pub extractor: Extractor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionResponse {
    pub value: Option<String>,
    pub reference: Option<Reference>,
}

/// Multi-valued resolution request
#[derive(Debug)]
pub struct MultiResolutionRequest<'a> {
    pub current: &'a [String],
    pub references: &'a [Reference],
    pub selector: Option<&'a Selector>,
    pub target: &'a TargetKind,
    pub extractor: Extractor,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultiResolutionResponse {
    pub values: Vec<String>,
    pub references: Vec<Reference>,
}

pub struct ReferenceResolver {
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for ReferenceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceResolver").finish_non_exhaustive()
    }
}

impl ReferenceResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Resolve one field of the resource described by `from`.
    pub async fn resolve(
        &self,
        from: &ObjectMeta,
        req: ResolutionRequest<'_>,
    ) -> Result<ResolutionResponse, ReferenceError> {
        if let Some(current) = req.current.filter(|c| !c.is_empty()) {
            return Ok(ResolutionResponse {
                value: Some(current.to_string()),
                reference: req.reference.cloned(),
            });
        }

        let reference = match (req.reference, req.selector) {
            (Some(reference), _) => reference.clone(),
            (None, Some(selector)) => {
                let mut matches = self.select(from, selector, req.target).await?;
                if matches.is_empty() {
                    if selector.is_optional() {
                        return Ok(ResolutionResponse::default());
                    }
                    return Err(no_match(req.target, selector));
                }
                let first = matches.remove(0);
                Reference {
                    name: first.metadata.name.unwrap_or_default(),
                    policy: selector.policy.clone(),
                }
            }
            (None, None) => return Ok(ResolutionResponse::default()),
        };

        match self.fetch(&reference, req.target, req.extractor).await {
            Ok(value) => Ok(ResolutionResponse {
                value: Some(value),
                reference: Some(reference),
            }),
            Err(e) if reference.is_optional() && !matches!(e, ReferenceError::Store(_)) => {
                debug!(reference = %reference.name, error = %e, "Optional reference not resolved");
                Ok(ResolutionResponse {
                    value: None,
                    reference: Some(reference),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve a list field. Values keep the order of the references.
    pub async fn resolve_multi(
        &self,
        from: &ObjectMeta,
        req: MultiResolutionRequest<'_>,
    ) -> Result<MultiResolutionResponse, ReferenceError> {
        if !req.current.is_empty() {
            return Ok(MultiResolutionResponse {
                values: req.current.to_vec(),
                references: req.references.to_vec(),
            });
        }

        let references = if !req.references.is_empty() {
            req.references.to_vec()
        } else if let Some(selector) = req.selector {
            let matches = self.select(from, selector, req.target).await?;
            if matches.is_empty() && !selector.is_optional() {
                return Err(no_match(req.target, selector));
            }
            matches
                .into_iter()
                .map(|m| Reference {
                    name: m.metadata.name.unwrap_or_default(),
                    policy: selector.policy.clone(),
                })
                .collect()
        } else {
            return Ok(MultiResolutionResponse::default());
        };

        let mut values = Vec::with_capacity(references.len());
        for reference in &references {
            match self.fetch(reference, req.target, req.extractor).await {
                Ok(value) => values.push(value),
                Err(e) if reference.is_optional() && !matches!(e, ReferenceError::Store(_)) => {
                    debug!(reference = %reference.name, error = %e, "Optional reference not resolved");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(MultiResolutionResponse { values, references })
    }

    async fn fetch(
        &self,
        reference: &Reference,
        target: &TargetKind,
        extractor: Extractor,
    ) -> Result<String, ReferenceError> {
        let obj = self
            .store
            .get(&target.api_resource, &reference.name)
            .await?
            .ok_or_else(|| ReferenceError::NotFound {
                kind: target.kind().to_string(),
                name: reference.name.clone(),
            })?;
        extractor.extract(&obj).ok_or_else(|| ReferenceError::NotReady {
            kind: target.kind().to_string(),
            name: reference.name.clone(),
            field: extractor.describe(),
        })
    }

    /// Candidates matching the selector, sorted by name
    async fn select(
        &self,
        from: &ObjectMeta,
        selector: &Selector,
        target: &TargetKind,
    ) -> Result<Vec<DynamicObject>, ReferenceError> {
        let mut candidates = self
            .store
            .list(&target.api_resource, &selector.match_labels)
            .await?;
        if selector.match_controller_ref == Some(true) {
            let owner = controller_uid(from);
            candidates.retain(|c| owner.is_some() && controller_uid(&c.metadata) == owner);
        }
        candidates.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(candidates)
    }
}

fn controller_uid(meta: &ObjectMeta) -> Option<&str> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|o| o.controller == Some(true))
        .map(|o| o.uid.as_str())
}

fn no_match(target: &TargetKind, selector: &Selector) -> ReferenceError {
    let labels = selector
        .match_labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");
    ReferenceError::NoMatch {
        kind: target.kind().to_string(),
        selector: format!("{{{labels}}}"),
    }
}

/// Implemented by kinds with reference fields
#[async_trait]
pub trait ResolveReferences: Send {
    /// Resolve every reference field in `forProvider`
    async fn resolve_references(&mut self, _resolver: &ReferenceResolver) -> Result<(), ReferenceError> {
        Ok(())
    }
}

/// Resolve a single optional string field in place
pub async fn resolve_field(
    resolver: &ReferenceResolver,
    from: &ObjectMeta,
    value: &mut Option<String>,
    reference: &mut Option<Reference>,
    selector: Option<&Selector>,
    target: &TargetKind,
    extractor: Extractor,
) -> Result<(), ReferenceError> {
    let rsp = resolver
        .resolve(
            from,
            ResolutionRequest {
                current: value.as_deref(),
                reference: reference.as_ref(),
                selector,
                target,
                extractor,
            },
        )
        .await?;
    if rsp.value.is_some() {
        *value = rsp.value;
    }
    if rsp.reference.is_some() {
        *reference = rsp.reference;
    }
    Ok(())
}

/// Resolve a list field in place
pub async fn resolve_list(
    resolver: &ReferenceResolver,
    from: &ObjectMeta,
    values: &mut Vec<String>,
    references: &mut Vec<Reference>,
    selector: Option<&Selector>,
    target: &TargetKind,
    extractor: Extractor,
) -> Result<(), ReferenceError> {
    let rsp = resolver
        .resolve_multi(
            from,
            MultiResolutionRequest {
                current: values,
                references,
                selector,
                target,
                extractor,
            },
        )
        .await?;
    *values = rsp.values;
    *references = rsp.references;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryObjectStore;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn key_kind() -> TargetKind {
        TargetKind::external("kms.aws.octopilot.io", "v1alpha1", "Key", "keys")
    }

    fn key(name: &str, external: Option<&str>, labels: &[(&str, &str)], owner: Option<&str>) -> DynamicObject {
        let mut obj = DynamicObject::new(name, &key_kind().api_resource);
        if let Some(ext) = external {
            obj.metadata.annotations = Some(BTreeMap::from([(
                ANNOTATION_EXTERNAL_NAME.to_string(),
                ext.to_string(),
            )]));
        }
        obj.metadata.labels = Some(
            labels
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        if let Some(uid) = owner {
            obj.metadata.owner_references = Some(vec![OwnerReference {
                api_version: "example.org/v1".to_string(),
                kind: "Composite".to_string(),
                name: "parent".to_string(),
                uid: uid.to_string(),
                controller: Some(true),
                ..OwnerReference::default()
            }]);
        }
        obj.data = json!({"status": {"atProvider": {"arn": format!("arn:aws:kms:::key/{name}")}}});
        obj
    }

    fn resolver(objs: Vec<DynamicObject>) -> ReferenceResolver {
        let store = MemoryObjectStore::new();
        for o in objs {
            store.insert(&key_kind().api_resource, o);
        }
        ReferenceResolver::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_current_value_is_kept() {
        let r = resolver(vec![key("k", Some("other"), &[], None)]);
        let reference = Reference::new("k");
        let rsp = r
            .resolve(
                &ObjectMeta::default(),
                ResolutionRequest {
                    current: Some("explicit"),
                    reference: Some(&reference),
                    selector: None,
                    target: &key_kind(),
                    extractor: Extractor::ExternalName,
                },
            )
            .await
            .unwrap();
        assert_eq!(rsp.value.as_deref(), Some("explicit"));
    }

    #[tokio::test]
    async fn test_reference_resolves_external_name_and_arn() {
        let r = resolver(vec![key("k", Some("1234-abcd"), &[], None)]);
        let reference = Reference::new("k");
        let mut value = None;
        let mut reference_field = Some(reference.clone());
        resolve_field(
            &r,
            &ObjectMeta::default(),
            &mut value,
            &mut reference_field,
            None,
            &key_kind(),
            Extractor::ExternalName,
        )
        .await
        .unwrap();
        assert_eq!(value.as_deref(), Some("1234-abcd"));

        let mut arn = None;
        resolve_field(
            &r,
            &ObjectMeta::default(),
            &mut arn,
            &mut Some(reference),
            None,
            &key_kind(),
            Extractor::AtProvider("/arn"),
        )
        .await
        .unwrap();
        assert_eq!(arn.as_deref(), Some("arn:aws:kms:::key/k"));
    }

    #[tokio::test]
    async fn test_missing_and_unready_targets() {
        let r = resolver(vec![key("unready", None, &[], None)]);
        let missing = Reference::new("missing");
        let err = r
            .resolve(
                &ObjectMeta::default(),
                ResolutionRequest {
                    current: None,
                    reference: Some(&missing),
                    selector: None,
                    target: &key_kind(),
                    extractor: Extractor::ExternalName,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReferenceError::NotFound { .. }));

        let unready = Reference::new("unready");
        let err = r
            .resolve(
                &ObjectMeta::default(),
                ResolutionRequest {
                    current: None,
                    reference: Some(&unready),
                    selector: None,
                    target: &key_kind(),
                    extractor: Extractor::ExternalName,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReferenceError::NotReady { .. }));

        let optional: Reference =
            serde_json::from_value(json!({"name": "missing", "policy": {"resolution": "Optional"}})).unwrap();
        let rsp = r
            .resolve(
                &ObjectMeta::default(),
                ResolutionRequest {
                    current: None,
                    reference: Some(&optional),
                    selector: None,
                    target: &key_kind(),
                    extractor: Extractor::ExternalName,
                },
            )
            .await
            .unwrap();
        assert_eq!(rsp.value, None);
    }

    #[tokio::test]
    async fn test_selector_picks_first_match_by_name() {
        let r = resolver(vec![
            key("b", Some("id-b"), &[("team", "data")], None),
            key("a", Some("id-a"), &[("team", "data")], None),
            key("c", Some("id-c"), &[("team", "web")], None),
        ]);
        let selector = Selector {
            match_labels: BTreeMap::from([("team".to_string(), "data".to_string())]),
            ..Selector::default()
        };
        let mut value = None;
        let mut reference = None;
        resolve_field(
            &r,
            &ObjectMeta::default(),
            &mut value,
            &mut reference,
            Some(&selector),
            &key_kind(),
            Extractor::ExternalName,
        )
        .await
        .unwrap();
        assert_eq!(value.as_deref(), Some("id-a"));
        assert_eq!(reference.map(|r| r.name), Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_selector_match_controller_ref() {
        let r = resolver(vec![
            key("a", Some("id-a"), &[], Some("other-owner")),
            key("b", Some("id-b"), &[], Some("owner-1")),
        ]);
        let selector = Selector {
            match_controller_ref: Some(true),
            ..Selector::default()
        };
        let from = ObjectMeta {
            owner_references: Some(vec![OwnerReference {
                uid: "owner-1".to_string(),
                controller: Some(true),
                ..OwnerReference::default()
            }]),
            ..ObjectMeta::default()
        };
        let rsp = r
            .resolve(
                &from,
                ResolutionRequest {
                    current: None,
                    reference: None,
                    selector: Some(&selector),
                    target: &key_kind(),
                    extractor: Extractor::ExternalName,
                },
            )
            .await
            .unwrap();
        assert_eq!(rsp.value.as_deref(), Some("id-b"));

        let err = r
            .resolve(
                &ObjectMeta::default(),
                ResolutionRequest {
                    current: None,
                    reference: None,
                    selector: Some(&selector),
                    target: &key_kind(),
                    extractor: Extractor::ExternalName,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReferenceError::NoMatch { .. }));
    }

    #[tokio::test]
    async fn test_resolve_multi_from_selector() {
        let r = resolver(vec![
            key("sg-2", Some("sg-222"), &[("net", "db")], None),
            key("sg-1", Some("sg-111"), &[("net", "db")], None),
        ]);
        let selector = Selector {
            match_labels: BTreeMap::from([("net".to_string(), "db".to_string())]),
            ..Selector::default()
        };
        let mut values = Vec::new();
        let mut references = Vec::new();
        resolve_list(
            &r,
            &ObjectMeta::default(),
            &mut values,
            &mut references,
            Some(&selector),
            &key_kind(),
            Extractor::ExternalName,
        )
        .await
        .unwrap();
        assert_eq!(values, vec!["sg-111".to_string(), "sg-222".to_string()]);
        assert_eq!(references.len(), 2);
    }
}
