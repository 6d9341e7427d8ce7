//! VID:PID device filters

/// Check if a VID/PID pair is allowed by the filters
///
/// Filters look like `0xVID:0xPID`, either side may be `*`. An empty filter
/// list allows every device.
pub fn check_filter(vid: u16, pid: u16, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }

    filters.iter().any(|filter| {
        // Filters are validated by the config loader
        let Some((filter_vid, filter_pid)) = filter.split_once(':') else {
            return false;
        };
        matches_id(filter_vid, vid) && matches_id(filter_pid, pid)
    })
}

fn matches_id(pattern: &str, id: u16) -> bool {
    if pattern == "*" {
        return true;
    }

    let hex = pattern
        .strip_prefix("0x")
        .or_else(|| pattern.strip_prefix("0X"))
        .unwrap_or(pattern);
    u16::from_str_radix(hex, 16)
        .map(|v| v == id)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_logic() {
        let filters = vec!["0x04d8:0x003f".to_string(), "0xABCD:*".to_string()];

        assert!(check_filter(0x04d8, 0x003f, &filters));
        assert!(check_filter(0xABCD, 0x1111, &filters));
        assert!(check_filter(0xABCD, 0x9999, &filters));

        assert!(!check_filter(0x04d8, 0x9999, &filters));
        assert!(!check_filter(0x9999, 0x003f, &filters));
        assert!(!check_filter(0x0000, 0x0000, &filters));

        // Empty filters = allow all
        assert!(check_filter(0x1234, 0x5678, &[]));
    }

    #[test]
    fn test_wildcard_vendor() {
        let filters = vec!["*:0x003f".to_string()];
        assert!(check_filter(0x1111, 0x003f, &filters));
        assert!(!check_filter(0x1111, 0x0040, &filters));
    }

    #[test]
    fn test_malformed_filter_matches_nothing() {
        let filters = vec!["garbage".to_string()];
        assert!(!check_filter(0x04d8, 0x003f, &filters));
    }
}
