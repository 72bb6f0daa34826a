//! Error types for unsc-ingest
//!
//! This module provides the error taxonomy shared by the queue, the redirect
//! protocol and the collaborators:
//! - Transient fetch failures (transport errors, non-200 statuses)
//! - Protocol failures of the meta-refresh redirect chain
//! - Persistence conflicts (record already stored)
//! - Data inconsistencies between the upstream sources
//! - Fatal configuration errors that abort a run before it starts

use thiserror::Error;

/// Result type alias for unsc-ingest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for unsc-ingest
///
/// Every processing function returns this type. The retry queue classifies
/// it through [`IsRetryable`](crate::retry::IsRetryable); only
/// [`Error::Config`] is treated as fatal.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "cross_reference_path")
        key: Option<String>,
    },

    /// Network error (timeout, connection reset, DNS, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Upstream answered with a status other than 200
    #[error("unexpected HTTP status {status} for {url}")]
    HttpStatus {
        /// The URL that was requested
        url: String,
        /// The status code returned by the server
        status: u16,
    },

    /// Meta-refresh redirect protocol failure
    #[error("redirect protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A uniqueness violation: the record is already stored
    #[error("record already exists: {0}")]
    Conflict(String),

    /// Two upstream sources disagree and no fallback resolved it
    #[error("data inconsistency: {0}")]
    DataInconsistency(String),

    /// Markup could not be turned into records
    #[error("parse error: {0}")]
    Parse(String),

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// SQLx database error
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a configuration error for a specific key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// True when the error reports a record that is already stored
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict(_))
    }
}

/// Terminal failures of the meta-refresh redirect protocol
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An HTML page came back without a refresh directive. Upstream serves
    /// this while a document is not (yet) available.
    #[error("no meta refresh found at {url}; document may not be available upstream yet")]
    MissingRedirect {
        /// The URL of the HTML page
        url: String,
    },

    /// The terminal response is not the expected artifact type
    #[error("expected content type '{expected}' from {url}, received '{found}'")]
    WrongContentType {
        /// The URL of the terminal response
        url: String,
        /// The configured artifact content type
        expected: String,
        /// The content type that was received (empty when absent)
        found: String,
    },

    /// The redirect chain exceeded the hop limit
    #[error("redirect chain from {url} exceeded {limit} hops")]
    TooManyRedirects {
        /// The URL the chain started from
        url: String,
        /// The configured hop limit
        limit: usize,
    },

    /// The login endpoint handed out no session cookie
    #[error("login at {url} set no session cookie")]
    MissingSessionCookie {
        /// The login URL
        url: String,
    },

    /// The refresh directive pointed at something that is not a URL
    #[error("invalid redirect target '{target}' at {url}: {reason}")]
    InvalidRedirect {
        /// The URL of the page holding the directive
        url: String,
        /// The raw target text
        target: String,
        /// Why it could not be resolved
        reason: String,
    },
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Unit of work used after commit or rollback
    #[error("unit of work already finished")]
    Finished,

    /// A referenced row does not exist
    #[error("record not found: {0}")]
    NotFound(String),
}

/// Error for a file that could not be found where a run expects it
pub(crate) fn missing_file(key: &str, path: &std::path::Path) -> Error {
    Error::config(key, format!("required file not found: {}", path.display()))
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_carries_key() {
        let err = Error::config("retry_bound", "must be at least 1");
        match &err {
            Error::Config { key, message } => {
                assert_eq!(key.as_deref(), Some("retry_bound"));
                assert_eq!(message, "must be at least 1");
            }
            other => panic!("expected Config, got {other:?}"),
        }
        assert_eq!(err.to_string(), "configuration error: must be at least 1");
    }

    #[test]
    fn protocol_errors_name_the_failure() {
        let missing = Error::from(ProtocolError::MissingRedirect {
            url: "https://docs.example/S/2019/961".into(),
        });
        assert!(missing.to_string().contains("no meta refresh"));

        let wrong = Error::from(ProtocolError::WrongContentType {
            url: "https://docs.example/x".into(),
            expected: "application/pdf".into(),
            found: "text/plain".into(),
        });
        assert!(wrong.to_string().contains("application/pdf"));
        assert!(wrong.to_string().contains("text/plain"));

        let hops = Error::from(ProtocolError::TooManyRedirects {
            url: "https://docs.example/loop".into(),
            limit: 3,
        });
        assert!(hops.to_string().contains("3 hops"));
    }

    #[test]
    fn conflict_is_detected() {
        assert!(Error::Conflict("S/2019/961".into()).is_conflict());
        assert!(!Error::DataInconsistency("S/18087".into()).is_conflict());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = missing_file("cross_reference_path", std::path::Path::new("/nope.tsv"));
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "cross_reference_path"));
        assert!(err.to_string().contains("/nope.tsv"));
    }
}
