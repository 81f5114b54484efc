//! Blob object path construction
//!
//! Objects live under `<sanitized actor>/<timestamp ms>_<document type>_<file name>`
//! so two actors (or two submissions by one actor) never collide.

use chrono::{DateTime, Utc};

/// Reduce an identifier to `[a-z0-9._-]`, collapsing everything else to `_`
pub fn sanitize_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-') {
            out.push(ch);
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }

    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.chars().take(96).collect()
    }
}

/// Full object path for one uploaded document
pub fn document_object_path(
    actor: &str,
    document_type: &str,
    file_name: &str,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{}/{}_{}_{}",
        sanitize_segment(actor),
        at.timestamp_millis(),
        sanitize_segment(document_type),
        sanitize_segment(file_name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_segment() {
        assert_eq!(sanitize_segment("Agent@Example.com"), "agent_example.com");
        assert_eq!(sanitize_segment("../../etc/passwd"), "etc_passwd");
        assert_eq!(sanitize_segment("My Voided Check (1).PDF"), "my_voided_check_1_.pdf");
        assert_eq!(sanitize_segment("///"), "unnamed");
    }

    #[test]
    fn test_document_object_path() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let path = document_object_path("a@x.com", "voided_check", "check.pdf", at);
        assert_eq!(path, "a_x.com/1700000000123_voided_check_check.pdf");
    }
}
