//! Error types for safedrive.
//!
//! This module defines all error types used throughout the safedrive crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for safedrive operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === API Errors ===
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {message}")]
    Transport {
        /// The requested URL.
        url: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The server answered 404 for the requested endpoint.
    #[error("endpoint not found (404): {url}")]
    EndpointNotFound {
        /// The requested URL.
        url: String,
    },

    /// The server answered with a non-success status.
    #[error("HTTP error! status: {status}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
    },

    /// The response body could not be decoded.
    #[error("invalid response from {url}: {message}")]
    InvalidResponse {
        /// The requested URL.
        url: String,
        /// Description of the decoding failure.
        message: String,
    },

    /// The request was cancelled by the caller.
    #[error("request cancelled: {url}")]
    Cancelled {
        /// The requested URL.
        url: String,
    },

    /// Every request of a combined load failed.
    #[error("all API requests failed")]
    AllRequestsFailed,

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An operation timed out.
    #[error("operation timed out: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
    },

    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for safedrive operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a transport error for the given URL.
    #[must_use]
    pub fn transport(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error for the given operation.
    #[must_use]
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Check if this error was caused by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Check if another attempt of the same request could succeed.
    ///
    /// Cancellation is final; everything that came back from the network
    /// (or failed to) is worth another try.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. }
                | Self::EndpointNotFound { .. }
                | Self::HttpStatus { .. }
                | Self::InvalidResponse { .. }
                | Self::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AllRequestsFailed;
        assert_eq!(err.to_string(), "all API requests failed");

        let err = Error::HttpStatus { status: 503 };
        assert_eq!(err.to_string(), "HTTP error! status: 503");
    }

    #[test]
    fn test_endpoint_not_found_display() {
        let err = Error::EndpointNotFound {
            url: "http://host/api/stats".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "endpoint not found (404): http://host/api/stats"
        );
    }

    #[test]
    fn test_is_cancelled() {
        let err = Error::Cancelled {
            url: "http://host/api/sensor".to_string(),
        };
        assert!(err.is_cancelled());
        assert!(!Error::timeout("GET /api/sensor").is_cancelled());
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::timeout("GET /health").is_retryable());
        assert!(Error::transport("http://host", "connection refused").is_retryable());
        assert!(Error::HttpStatus { status: 500 }.is_retryable());
        assert!(!Error::Cancelled {
            url: "http://host".to_string()
        }
        .is_retryable());
        assert!(!Error::AllRequestsFailed.is_retryable());
        assert!(!Error::internal("bug").is_retryable());
    }

    #[test]
    fn test_internal_error() {
        let err = Error::internal("something went wrong");
        assert_eq!(err.to_string(), "internal error: something went wrong");
    }

    #[test]
    fn test_transport_error_display() {
        let err = Error::transport("http://host/health", "connection refused");
        let msg = err.to_string();
        assert!(msg.contains("http://host/health"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_rusqlite_error() {
        let result = rusqlite::Connection::open_with_flags(
            "/nonexistent/path/db.sqlite",
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        );
        if let Err(sqlite_err) = result {
            let err: Error = sqlite_err.into();
            assert!(matches!(err, Error::DatabaseQuery(_)));
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_result: std::result::Result<i32, serde_json::Error> =
            serde_json::from_str("not valid json");
        if let Err(json_err) = json_result {
            let err: Error = json_err.into();
            assert!(matches!(err, Error::Json(_)));
        }
    }

    #[test]
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "invalid interval".to_string(),
        };
        assert!(err.to_string().contains("invalid interval"));
    }

    #[test]
    fn test_timeout_error_display() {
        let err = Error::timeout("GET /api/accidents");
        assert!(err.to_string().contains("GET /api/accidents"));
    }

    #[test]
    fn test_directory_create_error_display() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = Error::DirectoryCreate {
            path: PathBuf::from("/root/forbidden"),
            source: io_err,
        };
        assert!(err.to_string().contains("/root/forbidden"));
    }
}
