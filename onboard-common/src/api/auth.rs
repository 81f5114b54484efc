//! Identity gate checks for privileged API calls
//!
//! Two inputs decide whether a request may run a privileged action:
//! - the acting operator's email (`x-actor-email`), which must be a valid address
//! - an optional shared API token (`authorization: Bearer <token>`), required
//!   only when the service is configured with one
//!
//! Pure functions only; the HTTP extractor lives in the service crate.

use crate::email::parse_email;
use sha2::{Digest, Sha256};

/// Authentication error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAuthError {
    /// Actor header absent
    MissingActor,
    /// Actor header present but not a valid email address
    InvalidActor(String),
    /// Token required but no Authorization header
    MissingToken,
    /// Authorization header malformed or token mismatch
    InvalidToken,
}

impl ApiAuthError {
    /// True when the caller is known but not permitted (403) rather than unknown (401)
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ApiAuthError::InvalidToken)
    }
}

impl std::fmt::Display for ApiAuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiAuthError::MissingActor => write!(f, "Missing x-actor-email header"),
            ApiAuthError::InvalidActor(raw) => write!(f, "Invalid actor email: {}", raw),
            ApiAuthError::MissingToken => write!(f, "Missing bearer token"),
            ApiAuthError::InvalidToken => write!(f, "Invalid bearer token"),
        }
    }
}

impl std::error::Error for ApiAuthError {}

/// Validate the actor header, returning the normalized address
pub fn validate_actor_email(header: Option<&str>) -> Result<String, ApiAuthError> {
    let raw = header
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ApiAuthError::MissingActor)?;

    parse_email(raw).ok_or_else(|| ApiAuthError::InvalidActor(raw.to_string()))
}

/// Validate an `Authorization` header against the configured token
///
/// `expected = None` disables the check.
pub fn validate_bearer_token(
    authorization: Option<&str>,
    expected: Option<&str>,
) -> Result<(), ApiAuthError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let header = authorization.ok_or(ApiAuthError::MissingToken)?;
    let provided = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .ok_or(ApiAuthError::InvalidToken)?
        .trim();

    // Compare digests so the comparison length does not depend on the input
    let provided_digest = Sha256::digest(provided.as_bytes());
    let expected_digest = Sha256::digest(expected.as_bytes());

    if provided_digest == expected_digest {
        Ok(())
    } else {
        Err(ApiAuthError::InvalidToken)
    }
}
