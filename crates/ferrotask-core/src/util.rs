//! Shared utility functions used across multiple modules.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a timestamp as RFC 3339 with millisecond precision, UTC.
///
/// Millisecond granularity keeps conflict detection meaningful for edits
/// landing within the same second on different replicas.
pub fn format_rfc3339(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp, tolerating any offset.
///
/// Returns `None` for empty or unparsable input.
pub fn parse_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    format_rfc3339(Utc::now())
}

/// Derive a URL-safe slug from a project name.
///
/// Lowercases, maps runs of non-alphanumerics to single dashes, and trims
/// leading/trailing dashes. Empty input yields `"project"` so the caller
/// always gets a usable slug.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

/// Normalize optional text by trimming whitespace and removing empties.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basic() {
        assert_eq!(slugify("Weekend Errands"), "weekend-errands");
        assert_eq!(slugify("  Already--slugged  "), "already-slugged");
        assert_eq!(slugify("Ünïcode & Symbols!"), "n-code-symbols");
    }

    #[test]
    fn slugify_never_empty() {
        assert_eq!(slugify(""), "project");
        assert_eq!(slugify("!!!"), "project");
    }

    #[test]
    fn rfc3339_round_trip() {
        let parsed = parse_rfc3339("2025-01-01T10:00:00.250Z").unwrap();
        assert_eq!(format_rfc3339(parsed), "2025-01-01T10:00:00.250Z");
    }

    #[test]
    fn rfc3339_accepts_second_precision() {
        let parsed = parse_rfc3339("2025-01-01T10:00:00Z").unwrap();
        assert_eq!(format_rfc3339(parsed), "2025-01-01T10:00:00.000Z");
    }

    #[test]
    fn parse_rfc3339_rejects_garbage() {
        assert!(parse_rfc3339("").is_none());
        assert!(parse_rfc3339("not a timestamp").is_none());
    }

    #[test]
    fn parse_rfc3339_normalizes_offsets() {
        let parsed = parse_rfc3339("2025-01-01T12:00:00+02:00").unwrap();
        assert_eq!(format_rfc3339(parsed), "2025-01-01T10:00:00.000Z");
    }

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("example.com"));
    }
}
