//! Common error types for the onboarding services

use thiserror::Error;

/// Common result type for onboarding operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the onboarding crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error for stored documents
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation conflicts with the current state of a resource
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for SQLite lock contention errors that are worth retrying
    pub fn is_database_locked(&self) -> bool {
        match self {
            #[cfg(feature = "sqlx")]
            Error::Database(db_err) => {
                let text = db_err.to_string();
                text.contains("database is locked") || text.contains("database table is locked")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_database_errors_are_not_locked() {
        assert!(!Error::Internal("database is locked".to_string()).is_database_locked());
        assert!(!Error::Config("x".to_string()).is_database_locked());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::NotFound("application abc".to_string());
        assert_eq!(err.to_string(), "Not found: application abc");

        let err = Error::Conflict("status".to_string());
        assert_eq!(err.to_string(), "Conflict: status");
    }
}
