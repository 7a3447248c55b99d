//! Patient identifier extraction from letter text.

use regex::Regex;
use std::sync::OnceLock;

static IDENTIFIER_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Ten digits grouped 3-3-4 with an optional single whitespace separator between groups.
fn identifier_pattern() -> &'static Regex {
    IDENTIFIER_PATTERN
        .get_or_init(|| Regex::new(r"\b\d{3}\s?\d{3}\s?\d{4}\b").expect("valid identifier pattern"))
}

/// Scan letter text for a patient identifier and return the first match in document order,
/// with separators stripped.
///
/// The scan is purely shape-based: digits are returned as found, with no checksum or
/// registry validation.
pub fn extract_identifier(text: &str) -> Option<String> {
    identifier_pattern().find(text).map(|matched| {
        matched
            .as_str()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect()
    })
}
