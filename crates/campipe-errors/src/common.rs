//! Top-level error type and classification shared by every campipe crate.
//!
//! [`PipelineError`] wraps the four failure classes of the orchestration
//! layer (construction, per-request, systemic, protocol) plus configuration
//! errors, and exposes a category, a severity and a summary [`ResultCode`].

use core::fmt;

use crate::{ConfigError, ConstructionError, ProtocolViolation, RequestError, ResultCode, SystemicError};

/// Top-level error type for pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Graph construction or negotiation failed
    #[error("Construction error: {0}")]
    Construction(#[from] ConstructionError),

    /// A single request failed
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// The pipeline as a whole failed
    #[error("Systemic error: {0}")]
    Systemic(#[from] SystemicError),

    /// An internal invariant broke
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bare result code returned by a collaborator
    #[error("{0}")]
    Code(#[from] ResultCode),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Get the error category for classification.
    pub fn category(&self) -> ErrorCategory {
        match self {
            PipelineError::Construction(_) => ErrorCategory::Construction,
            PipelineError::Request(_) => ErrorCategory::Request,
            PipelineError::Systemic(_) => ErrorCategory::Systemic,
            PipelineError::Protocol(_) => ErrorCategory::Protocol,
            PipelineError::Config(_) => ErrorCategory::Config,
            PipelineError::Code(_) | PipelineError::Other(_) => ErrorCategory::Other,
        }
    }

    /// Get the error severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PipelineError::Construction(e) => e.severity(),
            PipelineError::Request(e) => e.severity(),
            PipelineError::Systemic(e) => e.severity(),
            PipelineError::Protocol(e) => e.severity(),
            PipelineError::Config(e) => e.severity(),
            PipelineError::Code(c) => c.severity(),
            PipelineError::Other(_) => ErrorSeverity::Error,
        }
    }

    /// Get the summary result code.
    pub fn code(&self) -> ResultCode {
        match self {
            PipelineError::Construction(e) => e.code(),
            PipelineError::Request(e) => e.code(),
            PipelineError::Systemic(e) => e.code(),
            PipelineError::Protocol(e) => e.code(),
            PipelineError::Config(_) => ResultCode::InvalidArgument,
            PipelineError::Code(c) => *c,
            PipelineError::Other(_) => ResultCode::Failed,
        }
    }

    /// Request id the error is scoped to, if any.
    pub fn request_id(&self) -> Option<u64> {
        match self {
            PipelineError::Request(e) => Some(e.request_id()),
            PipelineError::Protocol(e) => Some(e.request_id()),
            PipelineError::Systemic(SystemicError::Unrecoverable { request_id, .. }) => *request_id,
            _ => None,
        }
    }

    /// Check if this error is recoverable.
    pub fn is_recoverable(&self) -> bool {
        self.severity() < ErrorSeverity::Critical
    }

    /// Check if this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        self.code() == ResultCode::Cancelled
    }

    /// Create a generic error with a message.
    pub fn other(msg: impl Into<String>) -> Self {
        PipelineError::Other(msg.into())
    }
}

/// Error category for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorCategory {
    /// Construction and negotiation errors
    Construction = 0,
    /// Per-request errors
    Request = 1,
    /// Pipeline-wide errors
    Systemic = 2,
    /// Broken invariants
    Protocol = 3,
    /// Configuration errors
    Config = 4,
    /// Other errors
    Other = 255,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Construction => write!(f, "Construction"),
            ErrorCategory::Request => write!(f, "Request"),
            ErrorCategory::Systemic => write!(f, "Systemic"),
            ErrorCategory::Protocol => write!(f, "Protocol"),
            ErrorCategory::Config => write!(f, "Config"),
            ErrorCategory::Other => write!(f, "Other"),
        }
    }
}

/// Error severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ErrorSeverity {
    /// Informational, no action required
    Info = 0,
    /// Warning, may require attention
    Warning = 1,
    /// Error, operation failed
    Error = 2,
    /// Critical, pipeline may be in an unstable state
    Critical = 3,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "INFO"),
            ErrorSeverity::Warning => write!(f, "WARN"),
            ErrorSeverity::Error => write!(f, "ERROR"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Context information attached to an error.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    /// The operation that was being performed
    pub operation: String,
    /// Additional key-value pairs
    pub context: Vec<(String, String)>,
}

impl ErrorContext {
    /// Create a new error context for an operation.
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            context: Vec::new(),
        }
    }

    /// Add a context key-value pair.
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "operation: {}", self.operation)?;
        for (key, value) in &self.context {
            write!(f, ", {}: {}", key, value)?;
        }
        Ok(())
    }
}

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, ctx: ErrorContext) -> Result<T, PipelineError>;

    /// Add context with an operation name.
    fn with_context(self, operation: impl Into<String>) -> Result<T, PipelineError>;
}

impl<T, E: Into<PipelineError>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, ctx: ErrorContext) -> Result<T, PipelineError> {
        self.map_err(|e| {
            let err: PipelineError = e.into();
            PipelineError::Other(format!("{}: {}", ctx, err))
        })
    }

    fn with_context(self, operation: impl Into<String>) -> Result<T, PipelineError> {
        self.context(ErrorContext::new(operation))
    }
}
