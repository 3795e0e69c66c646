//! # Null-safe Field Helpers
//!
//! Optional parameters follow one convention throughout the crate: `None`
//! means "not set by the user", `Some(x)` means "set", even when `x` is the
//! type's zero value. AWS responses use the opposite convention for some
//! fields (zero or empty meaning "not reported"), so values read from AWS go
//! through [`non_default`] before they are compared or late-initialized.

/// Value of an optional field, or the type's default when absent
pub fn value_or_default<T: Default + Clone>(value: Option<&T>) -> T {
    value.cloned().unwrap_or_default()
}

/// `Some(value)` unless `value` is the type's default (`""`, `0`, `false`)
pub fn non_default<T: Default + PartialEq>(value: T) -> Option<T> {
    if value == T::default() {
        None
    } else {
        Some(value)
    }
}

/// Flattens an optional AWS value, treating default values as absent
pub fn observed<T: Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.and_then(non_default)
}

/// `Some` for a non-empty string slice
pub fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Tracks whether late initialization changed any field
#[derive(Debug, Default)]
pub struct LateInitializer {
    changed: bool,
}

impl LateInitializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy `observed` into `desired` when `desired` is unset and `observed`
    /// carries a non-default value. A set `desired` is never touched.
    pub fn option<T: Default + PartialEq>(&mut self, desired: &mut Option<T>, observed: Option<T>) {
        if desired.is_some() {
            return;
        }
        if let Some(value) = observed.and_then(non_default) {
            *desired = Some(value);
            self.changed = true;
        }
    }

    /// Copy a non-empty observed list into an empty desired list
    pub fn vec<T>(&mut self, desired: &mut Vec<T>, observed: Vec<T>) {
        if desired.is_empty() && !observed.is_empty() {
            *desired = observed;
            self.changed = true;
        }
    }

    /// Copy into a required string that the user left empty
    pub fn string(&mut self, desired: &mut String, observed: Option<String>) {
        if !desired.is_empty() {
            return;
        }
        if let Some(value) = observed.and_then(non_default) {
            *desired = value;
            self.changed = true;
        }
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_default() {
        assert_eq!(non_default(String::new()), None);
        assert_eq!(non_default(0_i32), None);
        assert_eq!(non_default(false), None);
        assert_eq!(non_default(7_i32), Some(7));
        assert_eq!(non_default("x".to_string()), Some("x".to_string()));
    }

    #[test]
    fn test_value_or_default() {
        assert_eq!(value_or_default::<i32>(None), 0);
        assert_eq!(value_or_default(Some(&"a".to_string())), "a");
    }

    #[test]
    fn test_late_init_fills_absent() {
        let mut li = LateInitializer::new();
        let mut port: Option<i32> = None;
        li.option(&mut port, Some(5432));
        assert_eq!(port, Some(5432));
        assert!(li.is_changed());
    }

    #[test]
    fn test_late_init_keeps_present_zero() {
        let mut li = LateInitializer::new();
        let mut retention: Option<i32> = Some(0);
        li.option(&mut retention, Some(7));
        assert_eq!(retention, Some(0));
        assert!(!li.is_changed());
    }

    #[test]
    fn test_late_init_ignores_default_observation() {
        let mut li = LateInitializer::new();
        let mut iops: Option<i32> = None;
        li.option(&mut iops, Some(0));
        li.option(&mut iops, None);
        assert_eq!(iops, None);
        assert!(!li.is_changed());
    }

    #[test]
    fn test_late_init_vec_and_string() {
        let mut li = LateInitializer::new();
        let mut groups: Vec<String> = Vec::new();
        li.vec(&mut groups, vec!["sg-1".to_string()]);
        let mut class = String::new();
        li.string(&mut class, Some("db.t3.micro".to_string()));
        assert_eq!(groups, vec!["sg-1"]);
        assert_eq!(class, "db.t3.micro");
        assert!(li.is_changed());
    }
}
