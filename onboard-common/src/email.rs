//! Email address normalization and validation
//!
//! Addresses are compared case-insensitively everywhere, so the canonical form
//! is trimmed and lowercased.

use once_cell::sync::Lazy;
use regex::Regex;

/// Strict address pattern: local part, `@`, dotted domain with a 2+ letter TLD
static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9._%+\-]+@[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9\-]*[a-z0-9])?)*\.[a-z]{2,}$")
        .expect("email pattern is a valid regex")
});

/// Trim and lowercase an address
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Validate an already-normalized address
pub fn is_valid_email(normalized: &str) -> bool {
    normalized.len() <= 254 && EMAIL_PATTERN.is_match(normalized)
}

/// Normalize then validate; `None` when the input is not a valid address
pub fn parse_email(raw: &str) -> Option<String> {
    let normalized = normalize_email(raw);
    is_valid_email(&normalized).then_some(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_email("  A@X.Com "), "a@x.com");
    }

    #[test]
    fn test_valid_addresses() {
        assert!(is_valid_email("ok@x.com"));
        assert!(is_valid_email("first.last+tag@mail.example.co"));
        assert!(is_valid_email("a_b-c@sub-domain.example.org"));
    }

    #[test]
    fn test_invalid_addresses() {
        assert!(!is_valid_email("bad-email"));
        assert!(!is_valid_email("no-tld@host"));
        assert!(!is_valid_email("@x.com"));
        assert!(!is_valid_email("a@-x.com"));
        assert!(!is_valid_email("a b@x.com"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn test_parse_email() {
        assert_eq!(parse_email(" Dup@X.com"), Some("dup@x.com".to_string()));
        assert_eq!(parse_email("bad-email"), None);
    }
}
