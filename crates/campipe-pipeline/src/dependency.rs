//! Deferred dependency queue interface.
//!
//! The queue resolves inter-node property and fence dependencies and owns
//! the per-request error state. The pipeline queries it on every
//! completion path and reports fence outcomes to it so nodes waiting on a
//! failed fence are released with an error instead of hanging.

use std::fmt;

use crate::fence::FenceHandle;
use crate::types::NodeId;

/// Deferred dependency queue shared by the pipelines of a session.
pub trait DependencyQueue: Send + Sync + fmt::Debug {
    /// Whether `request_id` is marked failed for `pipeline_index`.
    fn is_request_in_error(&self, pipeline_index: u32, request_id: u64) -> bool;

    /// A fence completed successfully.
    fn fence_signaled(&self, pipeline_index: u32, fence: FenceHandle, request_id: u64);

    /// A fence completed with an error. `flushing` tells the queue the
    /// failure is expected.
    fn fence_error_signaled(&self, pipeline_index: u32, fence: FenceHandle, request_id: u64, flushing: bool);

    /// Queue `node` for `request_id`; it runs once its dependencies are met.
    fn add_deferred_node(&self, pipeline_index: u32, request_id: u64, node: NodeId);

    /// Run every node whose dependencies are met.
    fn dispatch_ready_nodes(&self);

    /// Fail a deferred node's request during a flush.
    fn notify_request_error(&self, pipeline_index: u32, request_id: u64, node: NodeId);
}
