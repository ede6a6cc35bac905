//! Configuration errors.

use crate::common::ErrorSeverity;

/// Invalid pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The pipeline name is empty
    #[error("Pipeline name must not be empty")]
    EmptyName,

    /// A field must be greater than zero
    #[error("{field} must be greater than 0")]
    Zero {
        /// Field name
        field: &'static str,
    },

    /// The default request queue depth exceeds the maximum
    #[error("Default request queue depth {default} exceeds maximum {max}")]
    DepthAboveMax {
        /// Default depth
        default: u32,
        /// Maximum depth
        max: u32,
    },

    /// A field holds an invalid value
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue {
        /// Field name
        field: &'static str,
        /// Reason
        reason: String,
    },
}

impl ConfigError {
    /// Create a zero-value error.
    pub fn zero(field: &'static str) -> Self {
        ConfigError::Zero { field }
    }

    /// Create an invalid value error.
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Error
    }
}
