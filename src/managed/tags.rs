//! # Tag Reconciliation
//!
//! Tags are carried as an ordered list of `{key, value}` but compared as a
//! map by key.

use crate::crd::Tag;
use std::collections::BTreeMap;

/// Tag changes needed to turn the current set into the desired one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagDiff {
    /// Tags to add (new keys, and changed values with their new value)
    pub add: Vec<Tag>,
    /// Keys to remove (keys no longer desired, and keys whose value changed)
    pub remove: Vec<String>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Tags as a key-to-value map; on duplicate keys the last entry wins
pub fn tag_map(tags: &[Tag]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|t| (t.key.clone(), t.value.clone()))
        .collect()
}

/// Compute the add/remove sets between desired (`spec`) and `current` tags
///
/// A key whose value changed appears in both sets, so applying removals
/// before additions realizes the change in a single pass.
pub fn diff_tags(spec: &[Tag], current: &[Tag]) -> TagDiff {
    let spec_map = tag_map(spec);
    let current_map = tag_map(current);
    let mut diff = TagDiff::default();

    for (k, v) in &spec_map {
        match current_map.get(k) {
            None => diff.add.push(Tag::new(k, v)),
            Some(existing) if existing != v => {
                diff.remove.push(k.clone());
                diff.add.push(Tag::new(k, v));
            }
            Some(_) => {}
        }
    }
    for k in current_map.keys() {
        if !spec_map.contains_key(k) {
            diff.remove.push(k.clone());
        }
    }
    diff.remove.sort();
    diff
}

pub fn are_tags_up_to_date(spec: &[Tag], current: &[Tag]) -> bool {
    diff_tags(spec, current).is_empty()
}

/// Apply a diff to a tag map: removals first, then additions
pub fn apply_diff(current: &[Tag], diff: &TagDiff) -> BTreeMap<String, String> {
    let mut map = tag_map(current);
    for k in &diff.remove {
        map.remove(k);
    }
    for t in &diff.add {
        map.insert(t.key.clone(), t.value.clone());
    }
    map
}

/// Insert or update a tag, keeping the list sorted by key.
/// Returns whether the list changed.
pub fn add_tag(tags: &mut Vec<Tag>, key: &str, value: &str) -> bool {
    match tags.binary_search_by(|t| t.key.as_str().cmp(key)) {
        Ok(i) if tags[i].value == value => false,
        Ok(i) => {
            tags[i].value = value.to_string();
            true
        }
        Err(i) => {
            tags.insert(i, Tag::new(key, value));
            true
        }
    }
}

/// First key that appears more than once, if any
pub fn duplicate_key(tags: &[Tag]) -> Option<&str> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .map(|t| t.key.as_str())
        .find(|k| !seen.insert(*k))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
        pairs.iter().map(|(k, v)| Tag::new(*k, *v)).collect()
    }

    #[test]
    fn test_diff_add_remove_change() {
        let spec = tags(&[("env", "prod"), ("team", "data"), ("new", "1")]);
        let current = tags(&[("env", "dev"), ("team", "data"), ("old", "x")]);
        let diff = diff_tags(&spec, &current);
        assert_eq!(diff.add, tags(&[("env", "prod"), ("new", "1")]));
        assert_eq!(diff.remove, vec!["env", "old"]);
    }

    #[test]
    fn test_apply_diff_yields_spec() {
        let cases = [
            (tags(&[]), tags(&[("a", "1")])),
            (tags(&[("a", "1")]), tags(&[])),
            (tags(&[("a", "2"), ("b", "3")]), tags(&[("a", "1"), ("c", "4")])),
            (tags(&[("a", "1")]), tags(&[("a", "1")])),
        ];
        for (spec, current) in cases {
            let diff = diff_tags(&spec, &current);
            assert_eq!(apply_diff(&current, &diff), tag_map(&spec));
        }
    }

    #[test]
    fn test_up_to_date_ignores_order() {
        let spec = tags(&[("b", "2"), ("a", "1")]);
        let current = tags(&[("a", "1"), ("b", "2")]);
        assert!(are_tags_up_to_date(&spec, &current));
    }

    #[test]
    fn test_add_tag_sorted_and_idempotent() {
        let mut list = tags(&[("b", "2")]);
        assert!(add_tag(&mut list, "a", "1"));
        assert!(add_tag(&mut list, "c", "3"));
        assert!(!add_tag(&mut list, "a", "1"));
        assert!(add_tag(&mut list, "b", "9"));
        assert_eq!(list, tags(&[("a", "1"), ("b", "9"), ("c", "3")]));
    }

    #[test]
    fn test_duplicate_key() {
        assert_eq!(duplicate_key(&tags(&[("a", "1"), ("a", "2")])), Some("a"));
        assert_eq!(duplicate_key(&tags(&[("a", "1"), ("b", "2")])), None);
    }
}
