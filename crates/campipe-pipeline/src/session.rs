//! Records delivered to the owning session.
//!
//! The pipeline reports shutters, buffers, metadata and typed errors as
//! [`ResultRecord`]s keyed by pipeline index. What the session does with
//! them is outside this crate.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{BufferDescriptor, StreamId};

/// Error code carried by an error record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The device is unusable
    Device,
    /// The whole request failed
    Request,
    /// Result metadata for the request is unavailable
    Result,
    /// One output buffer failed
    Buffer,
    /// The pipeline needs recovery
    Recovery,
}

/// Typed error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Error code
    pub code: ErrorCode,
    /// Framework sequence id of the affected frame, zero for device-wide errors
    pub sequence_id: u32,
    /// Stream of the affected buffer, if any
    pub stream_id: Option<StreamId>,
    /// Affected buffer, if any
    pub buffer: Option<BufferDescriptor>,
    /// Sensor-level teardown required
    pub full_recovery: bool,
}

impl ErrorRecord {
    /// Error record without buffer context.
    #[must_use]
    pub fn new(code: ErrorCode, sequence_id: u32) -> Self {
        Self {
            code,
            sequence_id,
            stream_id: None,
            buffer: None,
            full_recovery: false,
        }
    }
}

/// Payload of a session record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResultPayload {
    /// Start of exposure for one frame
    Shutter {
        /// Frame sequence id
        sequence_id: u32,
        /// Capture timestamp in nanoseconds
        timestamp: u64,
    },
    /// Start of frame reported by the sensor
    Sof {
        /// Hardware frame counter
        frame_number: u64,
        /// SOF timestamp in nanoseconds
        timestamp: u64,
        /// Sequence id when the frame maps onto a live request
        sequence_id: Option<u32>,
    },
    /// Full result metadata for one frame
    Metadata {
        /// Frame sequence id
        sequence_id: u32,
        /// Sensor timestamp in nanoseconds
        timestamp: u64,
    },
    /// Early metadata subset for one frame
    PartialMetadata {
        /// Frame sequence id
        sequence_id: u32,
    },
    /// Metadata buffers of the request can be reused
    MetaBufferDone {
        /// Frame sequence id
        sequence_id: u32,
    },
    /// Output buffer ready
    Buffer {
        /// Frame sequence id
        sequence_id: u32,
        /// Stream the buffer belongs to
        stream_id: StreamId,
        /// Buffer descriptor
        buffer: BufferDescriptor,
    },
    /// Typed error
    Error(ErrorRecord),
}

impl ResultPayload {
    /// Short kind name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ResultPayload::Shutter { .. } => "shutter",
            ResultPayload::Sof { .. } => "sof",
            ResultPayload::Metadata { .. } => "metadata",
            ResultPayload::PartialMetadata { .. } => "partial-metadata",
            ResultPayload::MetaBufferDone { .. } => "meta-buffer-done",
            ResultPayload::Buffer { .. } => "buffer",
            ResultPayload::Error(_) => "error",
        }
    }
}

/// One notification for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    /// Index of the emitting pipeline
    pub pipeline_index: u32,
    /// Request the record refers to, zero for device-wide events
    pub request_id: u64,
    /// Record payload
    pub payload: ResultPayload,
}

impl fmt::Display for ResultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pipeline {} request {} {}",
            self.pipeline_index,
            self.request_id,
            self.payload.kind()
        )
    }
}

/// The session that owns the pipeline.
pub trait Session: Send + Sync + fmt::Debug {
    /// Deliver a record.
    fn deliver(&self, record: ResultRecord);

    /// Every node finished `request_id`, and every earlier request too.
    fn processing_done(&self, pipeline_index: u32, request_id: u64);

    /// Last request id the session has handed to the pipeline.
    fn last_request_id(&self) -> u64;

    /// Whether the session still holds undelivered results.
    fn has_pending_results(&self) -> bool;

    /// Requests submitted to the pipeline and not yet completed.
    fn live_pending_requests(&self) -> u32;
}
