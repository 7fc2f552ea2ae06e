//! Rules-timeout parsing
//!
//! Catalog records express how long a rules acceptance stays valid as a short
//! human string: `"45s"`, `"30m"`, `"1h"`, `"2d"`, `"1w"`. A bare number is
//! read as minutes.

use once_cell::sync::Lazy;
use std::time::Duration;

static TIMEOUT_RE: Lazy<Option<regex_lite::Regex>> = Lazy::new(|| {
    regex_lite::Regex::new(r"^([0-9]+(?:\.[0-9]+)?)\s*([a-z]*)$").ok()
});

/// Parse a rules timeout. Returns `None` for empty, zero or unparseable input,
/// which callers treat as "never expires".
pub fn parse_rules_timeout(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();
    let re = TIMEOUT_RE.as_ref()?;
    let caps = re.captures(&s)?;

    let num: f64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    let multiplier: f64 = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "" | "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        "d" | "day" | "days" => 86_400.0,
        "w" | "week" | "weeks" => 604_800.0,
        _ => return None,
    };

    seconds_to_duration(num * multiplier)
}

/// Positive, finite and representable; anything else never expires.
pub(crate) fn seconds_to_duration(secs: f64) -> Option<Duration> {
    if secs <= 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Format a duration back into the shortest whole unit.
pub fn format_rules_timeout(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        s if s % 604_800 == 0 && s > 0 => format!("{}w", s / 604_800),
        s if s % 86_400 == 0 && s > 0 => format!("{}d", s / 86_400),
        s if s % 3600 == 0 && s > 0 => format!("{}h", s / 3600),
        s if s % 60 == 0 && s > 0 => format!("{}m", s / 60),
        s => format!("{}s", s),
    }
}
