//! # Structural Diff
//!
//! Parameter blocks are compared through their JSON form. Only fields the
//! desired block actually carries take part: an absent (or `null`, or empty
//! list) desired field means "not managed" and never produces a diff.
//! Reference, selector and other meta-only fields are stripped from both
//! sides before comparison.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// Fields that never take part in drift detection
const META_FIELDS: &[&str] = &["region", "applyImmediately", "autogeneratePassword"];

/// Whether a `forProvider` field is meta-only (region, references, selectors)
pub fn is_meta_field(key: &str) -> bool {
    META_FIELDS.contains(&key)
        || key.ends_with("Ref")
        || key.ends_with("Refs")
        || key.ends_with("Selector")
}

/// Remove meta-only fields at every depth
pub fn strip_meta_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|k, _| !is_meta_field(k));
            for v in map.values_mut() {
                strip_meta_fields(v);
            }
        }
        Value::Array(items) => {
            for v in items {
                strip_meta_fields(v);
            }
        }
        _ => {}
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

fn patch_value(observed: Option<&Value>, desired: &Value) -> Option<Value> {
    match desired {
        Value::Null => None,
        Value::Array(a) if a.is_empty() => None,
        Value::Object(d) => {
            let mut out = Map::new();
            for (k, v) in d {
                if let Some(p) = patch_value(observed.and_then(|o| o.get(k)), v) {
                    out.insert(k.clone(), p);
                }
            }
            (!out.is_empty()).then_some(Value::Object(out))
        }
        _ if observed == Some(desired) => None,
        _ => Some(desired.clone()),
    }
}

fn collect_paths(prefix: &str, value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                collect_paths(&format!("{prefix}/{k}"), v, out);
            }
        }
        _ => out.push(prefix.to_string()),
    }
}

/// Minimal merge patch turning `observed` into `desired`
///
/// Returns `None` when nothing the desired block manages differs.
pub fn create_patch<T: Serialize>(observed: &T, desired: &T) -> Result<Option<Value>, serde_json::Error> {
    let mut observed = serde_json::to_value(observed)?;
    let mut desired = serde_json::to_value(desired)?;
    strip_meta_fields(&mut observed);
    strip_meta_fields(&mut desired);
    Ok(patch_value(Some(&observed), &desired))
}

/// JSON pointer paths (`/engineVersion`, `/computeResources/maxVcpus`) of
/// every managed field whose desired value differs from the observed one
pub fn diff_fields<T: Serialize>(observed: &T, desired: &T) -> Result<Vec<String>, serde_json::Error> {
    let mut paths = Vec::new();
    if let Some(patch) = create_patch(observed, desired)? {
        collect_paths("", &patch, &mut paths);
    }
    paths.sort();
    Ok(paths)
}

/// No managed field differs
pub fn is_up_to_date<T: Serialize>(observed: &T, desired: &T) -> Result<bool, serde_json::Error> {
    Ok(create_patch(observed, desired)?.is_none())
}

/// Fill every unset field of `desired` from `derived`, recursing into
/// objects. Set fields are never overwritten. Returns whether anything changed.
pub fn merge_unset(desired: &mut Value, derived: &Value) -> bool {
    let (Value::Object(d), Value::Object(s)) = (desired, derived) else {
        return false;
    };
    let mut changed = false;
    for (k, v) in s {
        if is_unset(v) {
            continue;
        }
        match d.get_mut(k) {
            Some(existing @ Value::Object(_)) => changed |= merge_unset(existing, v),
            Some(existing) if !is_unset(existing) => {}
            Some(existing) => {
                *existing = v.clone();
                changed = true;
            }
            None => {
                d.insert(k.clone(), v.clone());
                changed = true;
            }
        }
    }
    changed
}

/// Typed structural late-init: `Some(merged)` when `derived` filled any
/// field `desired` left unset
pub fn late_initialize<P: Serialize + DeserializeOwned>(
    desired: &P,
    derived: &P,
) -> Result<Option<P>, serde_json::Error> {
    let mut merged = serde_json::to_value(desired)?;
    let derived = serde_json::to_value(derived)?;
    if merge_unset(&mut merged, &derived) {
        Ok(Some(serde_json::from_value(merged)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Params {
        region: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<i32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        engine_version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        multi_az: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        kms_key_id_ref: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        groups: Vec<String>,
    }

    #[test]
    fn test_diff_ignores_unset_and_meta_fields() {
        let desired = Params {
            region: "us-east-1".into(),
            port: Some(5432),
            kms_key_id_ref: Some("key".into()),
            ..Default::default()
        };
        let observed = Params {
            region: "eu-west-1".into(),
            port: Some(5432),
            engine_version: Some("14.7".into()),
            ..Default::default()
        };
        assert!(is_up_to_date(&observed, &desired).unwrap());
    }

    #[test]
    fn test_diff_reports_changed_paths() {
        let desired = Params {
            port: Some(3306),
            multi_az: Some(false),
            groups: vec!["sg-1".into()],
            ..Default::default()
        };
        let observed = Params {
            port: Some(5432),
            multi_az: Some(true),
            groups: vec!["sg-1".into()],
            ..Default::default()
        };
        let paths = diff_fields(&observed, &desired).unwrap();
        assert_eq!(paths, vec!["/multiAz", "/port"]);
    }

    #[test]
    fn test_create_patch_is_minimal() {
        let patch = create_patch(
            &json!({"a": 1, "b": {"c": 2, "d": 3}}),
            &json!({"a": 1, "b": {"c": 2, "d": 4}, "e": null}),
        )
        .unwrap();
        assert_eq!(patch, Some(json!({"b": {"d": 4}})));
    }

    #[test]
    fn test_late_initialize_only_fills_unset() {
        let desired = Params {
            port: Some(0),
            ..Default::default()
        };
        let derived = Params {
            port: Some(5432),
            engine_version: Some("14.7".into()),
            groups: vec!["sg-1".into()],
            ..Default::default()
        };
        let merged = late_initialize(&desired, &derived).unwrap().unwrap();
        assert_eq!(merged.port, Some(0));
        assert_eq!(merged.engine_version.as_deref(), Some("14.7"));
        assert_eq!(merged.groups, vec!["sg-1"]);
    }

    #[test]
    fn test_late_initialize_no_change() {
        let desired = Params {
            port: Some(1),
            ..Default::default()
        };
        assert!(late_initialize(&desired, &Params::default()).unwrap().is_none());
    }

    #[test]
    fn test_merge_unset_recurses() {
        let mut desired = json!({"compute": {"maxVcpus": 4}});
        assert!(merge_unset(&mut desired, &json!({"compute": {"maxVcpus": 8, "minVcpus": 0}})));
        assert_eq!(desired, json!({"compute": {"maxVcpus": 4, "minVcpus": 0}}));
    }
}
