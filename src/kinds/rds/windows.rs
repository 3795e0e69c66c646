//! Backup and maintenance window comparison.
//!
//! AWS normalizes windows (lowercase day names, zero-padded times), so a
//! user's `Mon:3:00-Mon:04:00` and AWS's `mon:03:00-mon:04:00` are the same
//! window. Values that do not parse are compared as plain strings.

use chrono::{NaiveTime, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Point {
    day: Option<Weekday>,
    time: NaiveTime,
}

/// Parse `15:04` or `Mon:15:04`
fn parse_point(value: &str) -> Option<Point> {
    let value = value.trim();
    let (day, time) = match value.split_once(':') {
        Some((head, rest)) if head.chars().all(|c| c.is_ascii_alphabetic()) && !head.is_empty() => {
            (Some(head.parse::<Weekday>().ok()?), rest)
        }
        _ => (None, value),
    };
    let time = NaiveTime::parse_from_str(time, "%H:%M").ok()?;
    Some(Point { day, time })
}

fn parse_window(value: &str) -> Option<(Point, Point)> {
    let (start, end) = value.split_once('-')?;
    Some((parse_point(start)?, parse_point(end)?))
}

/// Whether two `start-end` windows describe the same interval
#[must_use]
pub fn windows_equal(a: &str, b: &str) -> bool {
    match (parse_window(a), parse_window(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.eq_ignore_ascii_case(b),
    }
}

/// A desired window is satisfied when unset or equal to the observed one
#[must_use]
pub fn window_up_to_date(desired: Option<&str>, observed: Option<&str>) -> bool {
    match (desired, observed) {
        (None, _) => true,
        (Some(d), Some(o)) => windows_equal(d, o),
        (Some(_), None) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_maintenance_window_ignores_case_and_padding() {
        assert!(windows_equal("Mon:3:00-Mon:04:00", "mon:03:00-mon:04:00"));
        assert!(!windows_equal("Mon:03:00-Mon:04:00", "tue:03:00-tue:04:00"));
    }

    #[test]
    fn test_backup_window() {
        assert!(windows_equal("07:00-07:30", "07:00-07:30"));
        assert!(!windows_equal("07:00-07:30", "07:00-08:00"));
    }

    #[test]
    fn test_unparseable_window_falls_back_to_string_compare() {
        assert!(windows_equal("whenever", "WHENEVER"));
        assert!(!windows_equal("whenever", "07:00-07:30"));
    }

    #[test]
    fn test_unset_desired_window_is_up_to_date() {
        assert!(window_up_to_date(None, Some("07:00-07:30")));
        assert!(!window_up_to_date(Some("07:00-07:30"), None));
    }
}
