//! Compact result codes.
//!
//! Result codes are the `Copy` summary of a failure. They are what the
//! pipeline hands across the node-callback hot path and what the session
//! sees in error records, so they must stay allocation free.

use core::fmt;

use crate::common::ErrorSeverity;

/// Pre-allocated result codes.
///
/// # Examples
///
/// ```
/// use campipe_errors::{ErrorSeverity, ResultCode};
///
/// let code = ResultCode::Cancelled;
/// assert_eq!(code.code(), 2);
/// assert_eq!(code.severity(), ErrorSeverity::Info);
/// assert!(!code.is_retryable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResultCode {
    /// Generic failure
    Failed = 1,
    /// Request cancelled, usually by a flush
    Cancelled = 2,
    /// A bounded wait expired
    TimedOut = 3,
    /// Operation not allowed in the current lifecycle state
    InvalidState = 4,
    /// Caller supplied an invalid argument
    InvalidArgument = 5,
    /// Allocation failed
    OutOfMemory = 6,
    /// Operation not supported by this pipeline
    Unsupported = 7,
    /// Resource temporarily busy
    Busy = 8,
}

impl ResultCode {
    /// Get the numeric code.
    ///
    /// ```
    /// use campipe_errors::ResultCode;
    ///
    /// assert_eq!(ResultCode::Failed.code(), 1);
    /// assert_eq!(ResultCode::TimedOut.code(), 3);
    /// ```
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Get the severity of this code.
    pub fn severity(self) -> ErrorSeverity {
        match self {
            ResultCode::Failed => ErrorSeverity::Error,
            ResultCode::Cancelled => ErrorSeverity::Info,
            ResultCode::TimedOut => ErrorSeverity::Error,
            ResultCode::InvalidState => ErrorSeverity::Warning,
            ResultCode::InvalidArgument => ErrorSeverity::Error,
            ResultCode::OutOfMemory => ErrorSeverity::Critical,
            ResultCode::Unsupported => ErrorSeverity::Warning,
            ResultCode::Busy => ErrorSeverity::Warning,
        }
    }

    /// Whether the same operation may succeed when retried later.
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            ResultCode::TimedOut | ResultCode::Busy | ResultCode::InvalidState
        )
    }

    /// Create a result code from its numeric value.
    ///
    /// Returns `None` for unknown values.
    ///
    /// ```
    /// use campipe_errors::ResultCode;
    ///
    /// assert_eq!(ResultCode::from_code(2), Some(ResultCode::Cancelled));
    /// assert_eq!(ResultCode::from_code(0), None);
    /// ```
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ResultCode::Failed),
            2 => Some(ResultCode::Cancelled),
            3 => Some(ResultCode::TimedOut),
            4 => Some(ResultCode::InvalidState),
            5 => Some(ResultCode::InvalidArgument),
            6 => Some(ResultCode::OutOfMemory),
            7 => Some(ResultCode::Unsupported),
            8 => Some(ResultCode::Busy),
            _ => None,
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Failed => write!(f, "Operation failed"),
            ResultCode::Cancelled => write!(f, "Request cancelled"),
            ResultCode::TimedOut => write!(f, "Wait timed out"),
            ResultCode::InvalidState => write!(f, "Invalid pipeline state"),
            ResultCode::InvalidArgument => write!(f, "Invalid argument"),
            ResultCode::OutOfMemory => write!(f, "Out of memory"),
            ResultCode::Unsupported => write!(f, "Unsupported operation"),
            ResultCode::Busy => write!(f, "Resource busy"),
        }
    }
}

impl std::error::Error for ResultCode {}
