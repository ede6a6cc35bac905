//! Protocol violations.
//!
//! A protocol violation means an internal invariant broke. They are logged
//! as defects and surfaced to the caller; nothing tries to repair them.

use crate::code::ResultCode;
use crate::common::ErrorSeverity;

/// Broken invariants of the orchestration protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolViolation {
    /// Fences were still registered when the slot was reused
    #[error("Request {request_id} still holds {remaining} fence(s)")]
    FenceLeak {
        /// Request id that owned the fences
        request_id: u64,
        /// Fences left in the list
        remaining: usize,
    },

    /// Shutter notifications arrived out of order outside a flush
    #[error("Non-incrementing shutter for request {request_id} after {last_shutter_request_id}")]
    ShutterOrder {
        /// Request id of this shutter
        request_id: u64,
        /// Request id of the previous shutter
        last_shutter_request_id: u64,
    },

    /// A completion arrived for a slot already reused by a newer request
    #[error("Completion for request {request_id} hit slot owned by request {slot_request_id}")]
    StaleSlot {
        /// Request id reported by the node
        request_id: u64,
        /// Request id currently owning the slot
        slot_request_id: u64,
    },

    /// No valid request was found within the search bound before a flush
    #[error("No valid request within {depth} of last completed request {last_completed}")]
    LastValidSearchExhausted {
        /// Last completed request id
        last_completed: u64,
        /// Search bound
        depth: u64,
    },
}

impl ProtocolViolation {
    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ProtocolViolation::LastValidSearchExhausted { .. } => ErrorSeverity::Error,
            _ => ErrorSeverity::Critical,
        }
    }

    /// Get the summary result code.
    pub fn code(&self) -> ResultCode {
        ResultCode::Failed
    }

    /// Request id involved in the violation.
    pub fn request_id(&self) -> u64 {
        match self {
            ProtocolViolation::FenceLeak { request_id, .. }
            | ProtocolViolation::ShutterOrder { request_id, .. }
            | ProtocolViolation::StaleSlot { request_id, .. } => *request_id,
            ProtocolViolation::LastValidSearchExhausted { last_completed, .. } => *last_completed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_leak_display() {
        let err = ProtocolViolation::FenceLeak {
            request_id: 5,
            remaining: 2,
        };
        assert_eq!(err.to_string(), "Request 5 still holds 2 fence(s)");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_stale_slot_request_id() {
        let err = ProtocolViolation::StaleSlot {
            request_id: 1,
            slot_request_id: 17,
        };
        assert_eq!(err.request_id(), 1);
    }
}
