//! Unified error system for Meridian
//!
//! One error enum shared by every crate. Collaborators (stores, resolvers)
//! return it, and the validator hands it back to callers untouched, so the
//! type derives `PartialEq` to let tests assert on exact values.

use serde::{Deserialize, Serialize};

/// Unified error type for all Meridian operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum MeridianError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Storage operation failed
    #[error("Storage error: {message}")]
    Storage {
        /// Error message describing the storage failure
        message: String,
    },

    /// Network or transport error
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// Identity reference could not be resolved to an on-chain signer
    #[error("Resolution failed: {message}")]
    Resolution {
        /// Error message describing the resolution failure
        message: String,
    },

    /// The governing context was cancelled
    #[error("Cancelled: {message}")]
    Cancelled {
        /// Error message describing what was interrupted
        message: String,
    },

    /// The governing context passed its deadline
    #[error("Deadline exceeded: {message}")]
    DeadlineExceeded {
        /// Error message describing what was interrupted
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl MeridianError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a resolution error
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::Resolution {
            message: message.into(),
        }
    }

    /// Create a cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a deadline exceeded error
    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a retry has a reasonable chance of succeeding.
    ///
    /// Only infrastructure faults qualify. Cancellation and bad input never
    /// get better by waiting.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Network { .. })
    }

    /// Whether this error came from a cancelled or expired context
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }
}

/// Standard Result type for Meridian operations
pub type Result<T> = std::result::Result<T, MeridianError>;

impl From<std::io::Error> for MeridianError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::not_found(err.to_string()),
            std::io::ErrorKind::InvalidData | std::io::ErrorKind::InvalidInput => {
                Self::invalid(err.to_string())
            }
            _ => Self::storage(err.to_string()),
        }
    }
}
