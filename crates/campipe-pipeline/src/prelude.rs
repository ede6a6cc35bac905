//! Prelude for campipe-pipeline
//!
//! Re-exports what a session needs to build and drive a pipeline.
//!
//! # Example
//!
//! ```
//! use campipe_pipeline::prelude::*;
//!
//! let graph = NodeGraph::new();
//! assert!(graph.is_empty());
//! ```

pub use crate::barrier::{AxisTargets, CompletionAxis};
pub use crate::config::{PipelineConfig, PipelineConfigBuilder};
pub use crate::dependency::DependencyQueue;
pub use crate::fence::{FenceHandle, FenceSignal, FenceStatus};
pub use crate::flush::{FlushInfo, FlushType};
pub use crate::graph::{Link, NodeGraph, SinkPort};
pub use crate::hardware::HardwareLink;
pub use crate::lifecycle::{DeactivateMode, PipelineStatus};
pub use crate::message::{ErrorMessage, FrameMessage, HardwareErrorKind, SyncMessage};
pub use crate::metadata::{MetadataPool, PoolKind, TuningData};
pub use crate::negotiation::{BufferProperties, BufferRequirement};
pub use crate::node::{Node, NodeRequestStatus};
pub use crate::pipeline::{Collaborators, Pipeline};
pub use crate::session::{ErrorCode, ErrorRecord, ResultPayload, ResultRecord, Session};
pub use crate::state::PipelineSnapshot;
pub use crate::types::{
    BatchFrameInfo, BufferDescriptor, CaptureRequest, Format, INVALID_REQUEST_ID, NodeId, PortId, StreamId, SyncMode,
};
pub use crate::validation::GraphValidator;
pub use campipe_errors::{PipelineError, Result};
