//! Synchronization fence bookkeeping.
//!
//! Every output port that feeds a pipeline sink registers one fence per
//! request. The fence sits in the request slot's [`FenceList`] until the
//! fence is signaled, at which point it is removed by value. Once all sink
//! ports of a request have signaled, the list must be empty.

use campipe_errors::{ProtocolViolation, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use tracing::{error, info, trace, warn};

use crate::pipeline::Pipeline;
use crate::session::{ErrorCode, ErrorRecord, ResultPayload};
use crate::types::{BufferDescriptor, NodeId, PortId};

/// Opaque hardware or software synchronization handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FenceHandle(pub u64);

impl fmt::Display for FenceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fence#{}", self.0)
    }
}

/// Outcome reported by a fence callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FenceStatus {
    /// The guarded buffer is ready
    Signaled,
    /// The producer failed
    Error,
}

/// Fences registered for one request.
///
/// Inline capacity covers the usual handful of sink ports per request;
/// removal scans only this request's fences.
#[derive(Debug, Clone, Default)]
pub struct FenceList {
    fences: SmallVec<[FenceHandle; 8]>,
}

impl FenceList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fence.
    pub fn register(&mut self, fence: FenceHandle) {
        self.fences.push(fence);
    }

    /// Remove the first entry equal to `fence`.
    ///
    /// Returns `false` when the fence was not registered.
    pub fn remove(&mut self, fence: FenceHandle) -> bool {
        match self.fences.iter().position(|f| *f == fence) {
            Some(index) => {
                self.fences.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether `fence` is registered.
    #[must_use]
    pub fn contains(&self, fence: FenceHandle) -> bool {
        self.fences.contains(&fence)
    }

    /// Number of registered fences.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fences.len()
    }

    /// Whether no fence is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }

    /// Drop every registered fence, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.fences.len();
        self.fences.clear();
        count
    }

    /// Iterate over registered fences in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &FenceHandle> {
        self.fences.iter()
    }
}

/// A fence callback as reported by a node's output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FenceSignal {
    /// Node owning the output port
    pub node: NodeId,
    /// Output port
    pub port: PortId,
    /// Signaled fence
    pub fence: FenceHandle,
    /// Request the buffer belongs to
    pub request_id: u64,
    /// Batched frame the buffer belongs to
    pub batch_index: usize,
    /// Buffer guarded by the fence
    pub buffer: BufferDescriptor,
    /// Outcome
    pub status: FenceStatus,
}

impl Pipeline {
    /// Track `fence` for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns a stale-slot violation if the slot was reused.
    pub fn register_fence(&self, request_id: u64, fence: FenceHandle) -> Result<()> {
        let slot = self.ring.owned(request_id)?;
        slot.fences().lock().register(fence);
        trace!(pipeline = %self.identity, request_id, %fence, "Fence registered");
        Ok(())
    }

    /// Stop tracking `fence`. Returns whether it was registered.
    ///
    /// # Errors
    ///
    /// Returns a stale-slot violation if the slot was reused.
    pub fn remove_fence(&self, request_id: u64, fence: FenceHandle) -> Result<bool> {
        let slot = self.ring.owned(request_id)?;
        Ok(slot.fences().lock().remove(fence))
    }

    /// Fences still registered for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns a stale-slot violation if the slot was reused.
    pub fn pending_fences(&self, request_id: u64) -> Result<usize> {
        Ok(self.ring.owned(request_id)?.fences().lock().len())
    }

    /// Check that every fence of `request_id` has signaled.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::FenceLeak`] with the number left.
    pub fn verify_fences_drained(&self, request_id: u64) -> Result<()> {
        let remaining = self.pending_fences(request_id)?;
        if remaining > 0 {
            error!(pipeline = %self.identity, request_id, remaining, "Fences left after request completed");
            return Err(ProtocolViolation::FenceLeak { request_id, remaining }.into());
        }
        Ok(())
    }

    /// Handle a fence callback.
    ///
    /// Sink ports turn into a `Buffer` record, or an `Error{Buffer}` record
    /// when the fence failed. Fences between nodes are forwarded to the
    /// dependency queue so waiting nodes are released, with an error when the
    /// fence failed. Failures expected during a flush log at `info`.
    ///
    /// # Errors
    ///
    /// Returns a stale-slot violation if the slot was reused.
    pub fn on_fence_signal(&self, signal: &FenceSignal) -> Result<()> {
        let FenceSignal {
            node,
            port,
            fence,
            request_id,
            batch_index,
            buffer,
            status,
        } = *signal;

        let slot = self.ring.owned(request_id)?;
        if !slot.fences().lock().remove(fence) {
            warn!(pipeline = %self.identity, request_id, %node, port, %fence, "Signaled fence was not registered");
        }

        let flushing = self.is_flushing();
        let pipeline_index = self.config.pipeline_index;

        if !self.graph.is_sink_port(node, port) {
            match status {
                FenceStatus::Signaled => self.dependencies().fence_signaled(pipeline_index, fence, request_id),
                FenceStatus::Error => {
                    self.log_fence_error(flushing, request_id, node, port);
                    self.dependencies()
                        .fence_error_signaled(pipeline_index, fence, request_id, flushing);
                }
            }
            return Ok(());
        }

        let frame = slot.frame();
        let sequence_id = frame
            .sequence_ids
            .get(batch_index)
            .copied()
            .unwrap_or_else(|| frame.first_sequence_id());
        let stream_id = self.graph.sink_stream(node, port).unwrap_or_default();

        match status {
            FenceStatus::Signaled => {
                self.deliver(
                    request_id,
                    ResultPayload::Buffer {
                        sequence_id,
                        stream_id,
                        buffer,
                    },
                );
                let delivered = slot.buffer_done();
                trace!(pipeline = %self.identity, request_id, stream_id, delivered, "Buffer delivered");
            }
            FenceStatus::Error => {
                self.log_fence_error(flushing, request_id, node, port);
                self.deliver(
                    request_id,
                    ResultPayload::Error(ErrorRecord {
                        stream_id: Some(stream_id),
                        buffer: Some(buffer),
                        ..ErrorRecord::new(ErrorCode::Buffer, sequence_id)
                    }),
                );
                self.dependencies()
                    .fence_error_signaled(pipeline_index, fence, request_id, flushing);
            }
        }
        Ok(())
    }

    fn log_fence_error(&self, flushing: bool, request_id: u64, node: NodeId, port: PortId) {
        if flushing {
            info!(pipeline = %self.identity, request_id, %node, port, "Fence error during flush");
        } else {
            error!(pipeline = %self.identity, request_id, %node, port, "Fence error");
        }
    }
}
