//! Error types for the emergency coordinator.
//!
//! This module defines the transport and infrastructure failures that can
//! occur around the coordination core. Business-rule refusals are not errors
//! in this sense; they live in [`crate::transition::TransitionError`] and
//! [`crate::state::Rejection`].

use std::path::PathBuf;
use thiserror::Error;

/// Infrastructure failure surfaced by the coordinator and its adapters.
#[derive(Error, Debug)]
pub enum Error {
    // Storage
    /// The reference store could not be opened.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Where the store was expected.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// Any other SQLite failure.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Schema upgrade did not complete.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Which step failed.
        message: String,
    },

    // Configuration
    /// Figment could not extract the layered config.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// A loaded value is out of range.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// The offending key and why.
        message: String,
    },

    // Feed
    /// The push channel could not be subscribed to.
    #[error("failed to subscribe to event feed: {message}")]
    FeedSubscribe {
        /// Description of what went wrong.
        message: String,
    },

    /// A raw row could not be turned into an event.
    #[error("cannot normalize field '{field}' with value '{value}'")]
    Normalize {
        /// Name of the offending field.
        field: &'static str,
        /// The raw value that was rejected.
        value: String,
    },

    // Dispatch
    /// An outbound notification could not be handed off.
    #[error("notification dispatch failed: {message}")]
    Dispatch {
        /// Description of what went wrong.
        message: String,
    },

    // Coordinator
    /// The coordinator loop is no longer running.
    #[error("coordinator is not running")]
    CoordinatorStopped,

    // I/O
    /// The store's parent directory could not be created.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Directory that was being created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A broken invariant inside the crate.
    #[error("internal error: {0}")]
    Internal(String),
}

/// `Result` alias over [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Shorthand for [`Error::Internal`].
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a feed subscription error.
    #[must_use]
    pub fn feed_subscribe(message: impl Into<String>) -> Self {
        Self::FeedSubscribe {
            message: message.into(),
        }
    }

    /// Create a dispatch error.
    #[must_use]
    pub fn dispatch(message: impl Into<String>) -> Self {
        Self::Dispatch {
            message: message.into(),
        }
    }

    /// Create a normalization error for a raw field.
    #[must_use]
    pub fn normalize(field: &'static str, value: impl Into<String>) -> Self {
        Self::Normalize {
            field,
            value: value.into(),
        }
    }

    /// Check if this error came from the push channel.
    #[must_use]
    pub fn is_feed_error(&self) -> bool {
        matches!(self, Self::FeedSubscribe { .. })
    }

    /// Check if this error indicates the coordinator loop has exited.
    #[must_use]
    pub fn is_coordinator_stopped(&self) -> bool {
        matches!(self, Self::CoordinatorStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CoordinatorStopped;
        assert_eq!(err.to_string(), "coordinator is not running");

        let err = Error::internal("test error");
        assert_eq!(err.to_string(), "internal error: test error");
    }

    #[test]
    fn test_is_feed_error() {
        assert!(Error::feed_subscribe("no channel").is_feed_error());
        assert!(!Error::dispatch("timeout").is_feed_error());
    }

    #[test]
    fn test_is_coordinator_stopped() {
        assert!(Error::CoordinatorStopped.is_coordinator_stopped());
        assert!(!Error::internal("x").is_coordinator_stopped());
    }

    #[test]
    fn test_normalize_error_display() {
        let err = Error::normalize("triggered_by", "robot");
        let msg = err.to_string();
        assert!(msg.contains("triggered_by"));
        assert!(msg.contains("robot"));
    }

    #[test]
    fn test_dispatch_error_display() {
        let err = Error::dispatch("webhook returned 502");
        assert_eq!(
            err.to_string(),
            "notification dispatch failed: webhook returned 502"
        );
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
    fn test_config_validation_error_display() {
        let err = Error::ConfigValidation {
            message: "poll_interval_ms must be greater than 0".to_string(),
        };
        assert!(err.to_string().contains("poll_interval_ms"));
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
