//! The contract a processing node offers to the pipeline.
//!
//! Node algorithms live outside this crate. The pipeline only drives the
//! calls below and receives completions through
//! [`Pipeline::notify_node_completion`](crate::Pipeline::notify_node_completion).

use campipe_errors::CodeResult;
use std::fmt;
use std::time::Duration;

use crate::lifecycle::DeactivateMode;
use crate::message::FrameMessage;
use crate::negotiation::{BufferProperties, BufferRequirement};
use crate::types::{CaptureRequest, NodeId};

/// Where a node is with a given request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeRequestStatus {
    /// Not yet set up
    #[default]
    Idle,
    /// Set up, not yet started
    Setup,
    /// Waiting on a dependency in the dependency queue
    Deferred,
    /// Executing
    Running,
    /// Hardware configuration submitted, waiting for output
    Submit,
    /// Finished
    Done,
}

/// A processing stage driven by the pipeline.
///
/// Every method except the identity accessors has a default, so simple
/// nodes only override what they need.
pub trait Node: Send + Sync + fmt::Debug {
    /// Node identity.
    fn id(&self) -> NodeId;

    /// Node name for logs.
    fn name(&self) -> &str;

    /// Whether the node reports partial metadata.
    fn reports_partial_metadata(&self) -> bool {
        false
    }

    /// Whether the node submits hardware configuration per request.
    fn submits_config(&self) -> bool {
        false
    }

    /// Map the merged requirement of this node's outputs onto the
    /// requirement for its inputs.
    ///
    /// # Errors
    ///
    /// Returns a code if the node cannot express the requirement.
    fn input_requirement(&self, output: &BufferRequirement) -> CodeResult<BufferRequirement> {
        Ok(*output)
    }

    /// Choose final output properties given what upstream nodes chose.
    ///
    /// `inputs` is empty for source nodes.
    ///
    /// # Errors
    ///
    /// Returns a code if no properties satisfy the requirement.
    fn determine_buffer_properties(
        &self,
        requirement: &BufferRequirement,
        inputs: &[BufferProperties],
    ) -> CodeResult<BufferProperties> {
        BufferProperties::fit(requirement, inputs.first())
    }

    /// Forget negotiation state before a renegotiation.
    fn reset_negotiation(&self) {}

    /// Acquire hardware resources.
    ///
    /// # Errors
    ///
    /// Returns a code if the resources are unavailable.
    fn acquire_resources(&self) -> CodeResult {
        Ok(())
    }

    /// Release hardware resources.
    ///
    /// # Errors
    ///
    /// Returns a code if release failed.
    fn release_resources(&self, _mode: DeactivateMode) -> CodeResult {
        Ok(())
    }

    /// Called once the hardware streams on.
    ///
    /// # Errors
    ///
    /// Returns a code if the node failed to start.
    fn on_stream_on(&self) -> CodeResult {
        Ok(())
    }

    /// Called when the pipeline streams off.
    ///
    /// # Errors
    ///
    /// Returns a code if the node failed to stop.
    fn on_stream_off(&self, _mode: DeactivateMode) -> CodeResult {
        Ok(())
    }

    /// Prepare the node for a request.
    ///
    /// Returns whether the node takes part in the request. A node that
    /// returns `false` must not report completions for it; the pipeline
    /// completes its axes on admission.
    ///
    /// # Errors
    ///
    /// Returns a code if setup failed.
    fn setup_request(&self, _request: &CaptureRequest) -> CodeResult<bool> {
        Ok(true)
    }

    /// Where the node is with `request_id`.
    fn request_status(&self, _request_id: u64) -> NodeRequestStatus {
        NodeRequestStatus::Done
    }

    /// Whether the node still waits on an unmet dependency for `request_id`.
    fn has_unmet_dependency(&self, _request_id: u64) -> bool {
        false
    }

    /// Cancel work for `request_id`.
    fn flush(&self, _request_id: u64) {}

    /// Drop dependencies registered for requests up to `last_completed`.
    fn clear_dependencies(&self, _last_completed: u64) {}

    /// Per-frame timing message from the synchronization layer.
    fn notify_frame(&self, _message: &FrameMessage) {}

    /// Whether the node is executing right now.
    fn is_processing(&self) -> bool {
        false
    }

    /// Time the node needs to finish what it is executing after a flush.
    fn flush_response_time(&self) -> Duration {
        Duration::ZERO
    }
}
