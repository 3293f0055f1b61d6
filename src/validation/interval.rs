use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

const SECOND_MS: f64 = 1000.0;
const MINUTE_MS: f64 = SECOND_MS * 60.0;
const HOUR_MS: f64 = MINUTE_MS * 60.0;
const DAY_MS: f64 = HOUR_MS * 24.0;
const WEEK_MS: f64 = DAY_MS * 7.0;
const YEAR_MS: f64 = DAY_MS * 365.25;

/// Longest interval string accepted, anything above is rejected unparsed.
const MAX_INTERVAL_LEN: usize = 100;

fn interval_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(-?(?:\d+)?\.?\d+) *(milliseconds?|msecs?|ms|seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|w|years?|yrs?|y)?$",
        )
        .expect("interval regex must compile")
    })
}

/// Parse a human duration such as `5ms`, `10s`, `1.5h` or `2 days`.
///
/// A bare number is read as milliseconds. Returns `None` for anything that
/// does not parse or is not strictly positive.
pub fn parse_interval(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() || value.len() > MAX_INTERVAL_LEN {
        return None;
    }

    let caps = interval_regex().captures(value)?;
    let amount: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps
        .get(2)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| "ms".to_owned());

    let factor = match unit.as_str() {
        "years" | "year" | "yrs" | "yr" | "y" => YEAR_MS,
        "weeks" | "week" | "w" => WEEK_MS,
        "days" | "day" | "d" => DAY_MS,
        "hours" | "hour" | "hrs" | "hr" | "h" => HOUR_MS,
        "minutes" | "minute" | "mins" | "min" | "m" => MINUTE_MS,
        "seconds" | "second" | "secs" | "sec" | "s" => SECOND_MS,
        "milliseconds" | "millisecond" | "msecs" | "msec" | "ms" => 1.0,
        _ => return None,
    };

    let nanos = (amount * factor * 1_000_000.0).round();
    if !nanos.is_finite() || nanos < 1.0 || nanos >= u64::MAX as f64 {
        return None;
    }
    Some(Duration::from_nanos(nanos as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_units() {
        assert_eq!(parse_interval("5ms"), Some(Duration::from_millis(5)));
        assert_eq!(parse_interval("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_interval("10m"), Some(Duration::from_secs(600)));
        assert_eq!(parse_interval("1.5h"), Some(Duration::from_secs(5400)));
        assert_eq!(parse_interval("2 days"), Some(Duration::from_secs(2 * 86_400)));
        assert_eq!(parse_interval("1 Week"), Some(Duration::from_secs(7 * 86_400)));
    }

    #[test]
    fn bare_number_is_milliseconds() {
        assert_eq!(parse_interval("250"), Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_garbage_and_non_positive_values() {
        assert_eq!(parse_interval("xxx"), None);
        assert_eq!(parse_interval(""), None);
        assert_eq!(parse_interval("0s"), None);
        assert_eq!(parse_interval("-5m"), None);
        assert_eq!(parse_interval("10 parsecs"), None);
        assert_eq!(parse_interval(&"1".repeat(101)), None);
    }
}
