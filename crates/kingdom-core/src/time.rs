use std::time::Duration;

/// Returns a simple ISO 8601 timestamp (Unix epoch seconds with Z suffix).
pub fn timestamp_now() -> String {
    let dur = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format!("{}Z", dur.as_secs())
}

/// Whole milliseconds in `d`, saturating at `i64::MAX`.
pub fn duration_to_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_saturate() {
        assert_eq!(duration_to_millis(Duration::from_millis(1500)), 1500);
        assert_eq!(duration_to_millis(Duration::MAX), i64::MAX);
    }

    #[test]
    fn timestamp_has_z_suffix() {
        let ts = timestamp_now();
        assert!(ts.ends_with('Z'));
        assert!(ts.trim_end_matches('Z').parse::<u64>().is_ok());
    }
}
