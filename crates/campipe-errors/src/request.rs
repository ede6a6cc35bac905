//! Per-request errors.
//!
//! A per-request error is isolated to one request id. The pipeline reports
//! it to the session and, through the dependency queue, to requests that
//! depend on it. Unrelated in-flight requests keep running.

use crate::code::ResultCode;
use crate::common::ErrorSeverity;

/// Errors scoped to a single request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// Request cancelled by a flush or by an empty node setup
    #[error("Request {request_id} cancelled")]
    Cancelled {
        /// Request id
        request_id: u64,
    },

    /// No node accepted the request during setup
    #[error("No node enabled for request {request_id}")]
    NoNodesEnabled {
        /// Request id
        request_id: u64,
    },

    /// A fence for the request was signaled with an error
    #[error("Fence error for request {request_id} on node {node} port {port}")]
    FenceError {
        /// Request id
        request_id: u64,
        /// Node owning the port
        node: String,
        /// Output port id
        port: u32,
    },

    /// The synchronization layer reported a hardware error for the request
    #[error("Hardware error {kind} for request {request_id}")]
    Hardware {
        /// Request id
        request_id: u64,
        /// Hardware error kind
        kind: String,
    },

    /// The dependency queue marked the request as failed
    #[error("Request {request_id} is in error state")]
    InErrorState {
        /// Request id
        request_id: u64,
    },

    /// A node rejected the request
    #[error("Node {node} rejected request {request_id}: {code}")]
    Rejected {
        /// Request id
        request_id: u64,
        /// Node identifier
        node: String,
        /// Reported result code
        code: ResultCode,
    },
}

impl RequestError {
    /// Get the request id this error applies to.
    pub fn request_id(&self) -> u64 {
        match self {
            RequestError::Cancelled { request_id }
            | RequestError::NoNodesEnabled { request_id }
            | RequestError::FenceError { request_id, .. }
            | RequestError::Hardware { request_id, .. }
            | RequestError::InErrorState { request_id }
            | RequestError::Rejected { request_id, .. } => *request_id,
        }
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RequestError::Cancelled { .. } | RequestError::NoNodesEnabled { .. } => {
                ErrorSeverity::Info
            }
            RequestError::InErrorState { .. } => ErrorSeverity::Warning,
            RequestError::FenceError { .. }
            | RequestError::Hardware { .. }
            | RequestError::Rejected { .. } => ErrorSeverity::Error,
        }
    }

    /// Get the summary result code.
    pub fn code(&self) -> ResultCode {
        match self {
            RequestError::Cancelled { .. } | RequestError::NoNodesEnabled { .. } => {
                ResultCode::Cancelled
            }
            RequestError::Rejected { code, .. } => *code,
            _ => ResultCode::Failed,
        }
    }

    /// Create a cancelled request error.
    pub fn cancelled(request_id: u64) -> Self {
        RequestError::Cancelled { request_id }
    }

    /// Create a fence error.
    pub fn fence_error(request_id: u64, node: impl Into<String>, port: u32) -> Self {
        RequestError::FenceError {
            request_id,
            node: node.into(),
            port,
        }
    }
}
