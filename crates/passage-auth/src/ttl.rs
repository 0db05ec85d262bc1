//! Token lifetime parsing

use chrono::Duration;
use tracing::warn;

/// Fallback lifetime applied when a TTL string cannot be understood
const DEFAULT_TTL_DAYS: i64 = 7;

/// Parse a lifetime string such as "15m", "12h" or "7d" into a duration.
///
/// Supported units: `d` (days), `h` (hours), `m` (minutes), `s` (seconds).
/// A malformed count or unrecognized unit falls back to 7 days rather than
/// failing, so a misconfigured deployment degrades to long-lived tokens
/// instead of refusing to start.
pub fn parse_ttl(raw: &str) -> Duration {
    let raw = raw.trim();

    let parsed = raw
        .char_indices()
        .last()
        .and_then(|(idx, unit)| {
            let count: i64 = raw[..idx].parse().ok()?;
            if count <= 0 {
                return None;
            }
            match unit {
                'd' => Some(Duration::days(count)),
                'h' => Some(Duration::hours(count)),
                'm' => Some(Duration::minutes(count)),
                's' => Some(Duration::seconds(count)),
                _ => None,
            }
        });

    match parsed {
        Some(duration) => duration,
        None => {
            warn!(
                "Unrecognized TTL '{}', falling back to {} days",
                raw, DEFAULT_TTL_DAYS
            );
            Duration::days(DEFAULT_TTL_DAYS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!(parse_ttl("15m"), Duration::minutes(15));
        assert_eq!(parse_ttl("12h"), Duration::hours(12));
        assert_eq!(parse_ttl("7d"), Duration::days(7));
        assert_eq!(parse_ttl("90s"), Duration::seconds(90));
    }

    #[test]
    fn test_whitespace_is_tolerated() {
        assert_eq!(parse_ttl(" 30m "), Duration::minutes(30));
    }

    #[test]
    fn test_unknown_unit_falls_back() {
        assert_eq!(parse_ttl("2w"), Duration::days(7));
        assert_eq!(parse_ttl("15"), Duration::days(7));
    }

    #[test]
    fn test_malformed_falls_back() {
        assert_eq!(parse_ttl(""), Duration::days(7));
        assert_eq!(parse_ttl("m"), Duration::days(7));
        assert_eq!(parse_ttl("-5m"), Duration::days(7));
        assert_eq!(parse_ttl("abcm"), Duration::days(7));
    }
}
