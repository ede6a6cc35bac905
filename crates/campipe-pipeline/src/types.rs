//! Core identifiers and request types.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Request id that never names a real request.
pub const INVALID_REQUEST_ID: u64 = 0;

/// Port identifier, unique within one node.
pub type PortId = u32;

/// Stream identifier carried by sink ports.
pub type StreamId = u32;

/// Node identity: node type plus instance number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId {
    /// Node type id
    pub type_id: u32,
    /// Instance of that type within the pipeline
    pub instance_id: u32,
}

impl NodeId {
    /// Create a node id.
    #[must_use]
    pub const fn new(type_id: u32, instance_id: u32) -> Self {
        Self {
            type_id,
            instance_id,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_id, self.instance_id)
    }
}

/// Per-frame information for one frame of a batched request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BatchFrameInfo {
    /// Framework sequence id of the frame
    pub sequence_id: u32,
    /// Streams that carry a buffer for this frame
    pub active_streams: u64,
}

/// Hardware synchronization mode used to open a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SyncMode {
    /// Request is frame-synchronized with its peers
    Sync,
    /// Request is opened without synchronization
    #[default]
    NoSync,
}

/// Snapshot of one capture request as admitted by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CaptureRequest {
    /// Request id, monotonically increasing
    pub request_id: u64,
    /// Hardware synchronization id for the request
    pub sync_id: u64,
    /// One entry per batched frame
    pub batches: SmallVec<[BatchFrameInfo; 4]>,
    /// Timestamp of the input buffer, used by offline pipelines for the shutter
    pub input_timestamp: u64,
}

impl CaptureRequest {
    /// Create a single-frame request whose sequence id equals its request id.
    #[must_use]
    pub fn single(request_id: u64) -> Self {
        let mut batches = SmallVec::new();
        batches.push(BatchFrameInfo {
            sequence_id: u32::try_from(request_id).unwrap_or(u32::MAX),
            active_streams: u64::MAX,
        });
        Self {
            request_id,
            sync_id: request_id,
            batches,
            input_timestamp: 0,
        }
    }

    /// Number of frames in the request, at least one.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.len().max(1)
    }
}

/// Opaque buffer descriptor handed through to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BufferDescriptor {
    /// Framework buffer handle
    pub handle: u64,
}

/// Pixel format negotiated on a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Format {
    /// Bayer raw
    #[default]
    Raw10,
    /// YUV 4:2:0 semi-planar, the fallback format
    Nv12,
    /// Universal bandwidth compressed YUV
    Ubwc,
    /// Compressed stream
    Jpeg,
    /// Sensor statistics
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display() {
        assert_eq!(NodeId::new(65536, 2).to_string(), "65536:2");
    }

    #[test]
    fn test_single_request() {
        let request = CaptureRequest::single(7);
        assert_eq!(request.batch_count(), 1);
        assert_eq!(request.batches.first().map(|b| b.sequence_id), Some(7));
    }

    #[test]
    fn test_empty_batch_counts_as_one() {
        let request = CaptureRequest::default();
        assert_eq!(request.batch_count(), 1);
    }
}
