//! Unified error handling for the oncall-rota crate
//!
//! This module provides a unified error type that consolidates the
//! domain-specific errors into a single `Error` enum, while keeping the
//! scheduler's own [`SchedulerError`] available where callers need detail.
//!
//! # Architecture
//!
//! - [`ErrorCategory`] - Classification of errors for handling strategies
//! - [`Error`] - Unified error enum wrapping all domain-specific errors
//!
//! # Usage
//!
//! ```rust,ignore
//! use oncall_rota::error::{Error, ErrorCategory};
//!
//! fn handle_error(err: Error) {
//!     if err.category() == ErrorCategory::Validation {
//!         eprintln!("Rejected: {}", err);
//!     } else if err.is_recoverable() {
//!         eprintln!("Retrying: {}", err);
//!     }
//! }
//! ```

use std::io;
use thiserror::Error;

pub use crate::scheduler::error::SchedulerError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bad input rejected before any persistence
    Validation,
    /// Scheduling state errors (not found, stale swap, ...)
    Scheduler,
    /// Storage and I/O errors
    Storage,
    /// Configuration errors
    Config,
    /// Notification delivery errors
    Notification,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Scheduler => "scheduler",
            Self::Storage => "storage",
            Self::Config => "config",
            Self::Notification => "notification",
            Self::Other => "other",
        }
    }
}

/// Unified error type for the oncall-rota crate
#[derive(Error, Debug)]
pub enum Error {
    /// Scheduler domain errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[source] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Generic error with context
    #[error("{context}")]
    Other {
        context: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a generic error with context
    pub fn other(context: impl Into<String>) -> Self {
        Self::Other {
            context: context.into(),
            source: None,
        }
    }

    /// Create a generic error with context and source
    pub fn with_source(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Other {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Scheduler(e) if e.is_validation() => ErrorCategory::Validation,
            Self::Scheduler(SchedulerError::Storage { .. }) => ErrorCategory::Storage,
            Self::Scheduler(_) => ErrorCategory::Scheduler,
            Self::Database(_) | Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Other,
            Self::Config(_) => ErrorCategory::Config,
            Self::Notification(_) => ErrorCategory::Notification,
            Self::Other { .. } => ErrorCategory::Other,
        }
    }

    /// Check if this error is recoverable (can be retried)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Scheduler(e) => e.is_recoverable(),
            Self::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Database(_) => false,
            Self::Io(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
            Self::Notification(_) => true,
            Self::Other { .. } => false,
        }
    }

    /// Borrow the scheduler error, if this is one
    pub fn as_scheduler(&self) -> Option<&SchedulerError> {
        match self {
            Self::Scheduler(e) => Some(e),
            _ => None,
        }
    }
}

// Conversion from rusqlite::Error
impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

// Conversion from anyhow::Error
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other {
            context: err.to_string(),
            source: None,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_category() {
        let err: Error = SchedulerError::invalid_policy("slot_duration", "too long").into();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_scheduler_category() {
        let err: Error = SchedulerError::SlotNotFound { slot_id: 9 }.into();
        assert_eq!(err.category(), ErrorCategory::Scheduler);
        assert!(err.as_scheduler().is_some());
    }

    #[test]
    fn test_storage_category() {
        let err: Error = SchedulerError::storage("lock", "poisoned").into();
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert!(err.is_recoverable());

        let db: Error = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(db.category(), ErrorCategory::Storage);
        assert!(!db.is_recoverable());
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("generation_time must be HH:MM");
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_error() {
        let err = Error::other("Something went wrong");
        assert_eq!(err.category(), ErrorCategory::Other);
        assert_eq!(err.to_string(), "Something went wrong");
    }
}
