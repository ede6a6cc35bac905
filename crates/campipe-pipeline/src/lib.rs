//! Camera pipeline orchestration core.
//!
//! A pipeline owns a fixed graph of processing nodes and drives capture
//! requests through it. Nodes run elsewhere and report back asynchronously;
//! this crate counts those reports, decides when results may be published
//! and keeps the stream lifecycle, flush and recovery consistent while many
//! threads call in at once.
//!
//! # Overview
//!
//! - **Negotiation**: two passes over the graph pick buffer properties for
//!   every link before streaming ([`negotiation`])
//! - **Completion barrier**: one ring slot per in-flight request with four
//!   lock-free completion axes ([`barrier`])
//! - **Fences**: per-request fence lists tie buffer readiness to request
//!   completion ([`fence`])
//! - **Lifecycle**: resource acquire/release and stream on/off
//!   ([`lifecycle`])
//! - **Flush and recovery**: cancellation, resynchronization and the
//!   invalid-SOF watchdog ([`flush`], [`message`])
//!
//! # Architecture
//!
//! ```text
//! session ──process_request──▶ Pipeline ──setup/defer──▶ nodes
//!    ▲                           │  ▲                      │
//!    │                           │  └──notify_node_*───────┘
//!    └──── ResultRecord ◀────────┘  ◀──SyncMessage── hardware sync layer
//! ```
//!
//! # Example
//!
//! ```
//! use campipe_pipeline::prelude::*;
//!
//! let config = PipelineConfig::builder()
//!     .name("Preview")
//!     .camera_id(1)
//!     .request_queue_depth(4)
//!     .usecase_fps(60)
//!     .build()?;
//!
//! assert_eq!(config.identity(), "Preview_0_cam_1");
//! assert_eq!(config.ring_capacity(), 8);
//! assert_eq!(config.max_pipeline_delay(), 4);
//! # Ok::<(), campipe_errors::PipelineError>(())
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod barrier;
pub mod config;
pub mod dependency;
pub mod fence;
pub mod flush;
pub mod graph;
pub mod hardware;
pub mod lifecycle;
pub mod message;
pub mod metadata;
pub mod negotiation;
pub mod node;
pub mod pipeline;
pub mod prelude;
pub mod session;
pub mod state;
pub mod types;
pub mod validation;

#[cfg(test)]
mod testing;

pub use barrier::{AxisTargets, CompletionAxis};
pub use config::PipelineConfig;
pub use fence::{FenceHandle, FenceSignal, FenceStatus};
pub use flush::{FlushInfo, FlushType};
pub use graph::NodeGraph;
pub use lifecycle::{DeactivateMode, PipelineStatus};
pub use message::{ErrorMessage, FrameMessage, HardwareErrorKind, SyncMessage};
pub use pipeline::{Collaborators, Pipeline};
pub use state::PipelineSnapshot;
pub use types::{CaptureRequest, NodeId};
pub use validation::GraphValidator;
