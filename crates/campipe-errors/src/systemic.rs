//! Systemic errors.
//!
//! Failures of the pipeline as a whole: resource acquisition, hardware link
//! management, bounded waits and unrecoverable hardware faults. These are
//! escalated to the session as recovery events.

use crate::code::ResultCode;
use crate::common::ErrorSeverity;

/// Pipeline-wide failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SystemicError {
    /// A node failed to acquire its hardware resources
    #[error("Node {node} failed to acquire resources: {code}")]
    ResourceAcquisition {
        /// Node identifier
        node: String,
        /// Reported result code
        code: ResultCode,
    },

    /// A node failed to release its hardware resources
    #[error("Node {node} failed to release resources: {code}")]
    ResourceRelease {
        /// Node identifier
        node: String,
        /// Reported result code
        code: ResultCode,
    },

    /// Stream-on waited too long for every node to submit its configuration
    #[error("Stream on timed out after {timeout_ms}ms: {done} of {expected} config requests done")]
    StreamOnTimeout {
        /// Timeout in milliseconds
        timeout_ms: u64,
        /// Config-done count observed
        done: u64,
        /// Config-done count required
        expected: u64,
    },

    /// Waiting for stream-on completion timed out
    #[error("Timed out after {timeout_ms}ms waiting for stream on")]
    StreamOnDoneTimeout {
        /// Timeout in milliseconds
        timeout_ms: u64,
    },

    /// Waiting for all node requests timed out
    #[error(
        "Timed out after {timeout_ms}ms waiting for nodes: last completed {last_completed}, last submitted {last_submitted}"
    )]
    AllNodesDoneTimeout {
        /// Timeout in milliseconds
        timeout_ms: u64,
        /// Last completed request id
        last_completed: u64,
        /// Last submitted request id
        last_submitted: u64,
    },

    /// A hardware link operation failed
    #[error("Hardware {operation} failed: {code}")]
    Hardware {
        /// Operation name
        operation: &'static str,
        /// Reported result code
        code: ResultCode,
    },

    /// A node failed a stream transition
    #[error("Node {node} failed {operation}: {code}")]
    NodeStream {
        /// Node identifier
        node: String,
        /// Operation name
        operation: &'static str,
        /// Reported result code
        code: ResultCode,
    },

    /// Operation not allowed in the current lifecycle state
    #[error("Cannot {operation} while pipeline is {state}")]
    InvalidState {
        /// Operation name
        operation: &'static str,
        /// Current lifecycle state description
        state: &'static str,
    },

    /// Unrecoverable hardware error
    #[error("Unrecoverable error (full recovery: {full_recovery})")]
    Unrecoverable {
        /// Request id the error was reported against, if any
        request_id: Option<u64>,
        /// Sensor-level teardown required
        full_recovery: bool,
    },
}

impl SystemicError {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SystemicError::Unrecoverable { .. } => ErrorSeverity::Critical,
            SystemicError::InvalidState { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get the summary result code.
    pub fn code(&self) -> ResultCode {
        match self {
            SystemicError::ResourceAcquisition { code, .. }
            | SystemicError::ResourceRelease { code, .. }
            | SystemicError::Hardware { code, .. }
            | SystemicError::NodeStream { code, .. } => *code,
            SystemicError::StreamOnTimeout { .. }
            | SystemicError::StreamOnDoneTimeout { .. }
            | SystemicError::AllNodesDoneTimeout { .. } => ResultCode::TimedOut,
            SystemicError::InvalidState { .. } => ResultCode::InvalidState,
            SystemicError::Unrecoverable { .. } => ResultCode::Failed,
        }
    }

    /// Whether the session must tear down the sensor.
    pub fn requires_full_recovery(&self) -> bool {
        matches!(
            self,
            SystemicError::Unrecoverable {
                full_recovery: true,
                ..
            }
        )
    }
}
