//! Flush and recovery.
//!
//! A flush is a single atomic flag. Every hot path reads it without locking;
//! only [`Pipeline::begin_flush`] and [`Pipeline::end_flush`] write it.
//! While it is set, new requests are flushed instead of dispatched and the
//! shutter ordering check is relaxed for requests submitted before the flush.

use campipe_errors::{ProtocolViolation, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::barrier::CompletionAxis;
use crate::lifecycle::PipelineStatus;
use crate::node::NodeRequestStatus;
use crate::pipeline::Pipeline;
use crate::session::{ErrorCode, ErrorRecord, ResultPayload};
use crate::types::INVALID_REQUEST_ID;

/// How much of the pipeline a flush covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FlushType {
    /// Only the requests named by the session
    Selective,
    /// Every in-flight request
    #[default]
    All,
}

/// What the last flush recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlushInfo {
    /// A flush happened in this stream cycle
    pub has_flush_occurred: bool,
    /// Type of the last flush
    pub flush_type: FlushType,
    /// Last request submitted when the flush began
    pub last_flush_request_id: u64,
    /// Session's last request id when the flush began
    pub last_request_id: u64,
    /// Last completed request not marked in error, if one was found
    pub last_valid_request_id: Option<u64>,
}

impl Pipeline {
    /// Whether a flush is in progress.
    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::Acquire)
    }

    /// Copy of the flush bookkeeping.
    #[must_use]
    pub fn flush_info(&self) -> FlushInfo {
        *self.flush_info.read()
    }

    /// Start a flush.
    ///
    /// Sets the flush flag, records the flush window, searches backwards for
    /// the last valid completed request and aborts a pending stream-on wait.
    /// The flush is in effect even when this returns an error.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolViolation::LastValidSearchExhausted`] if every
    /// request within the queue depth of the last completed one is in error.
    pub fn begin_flush(&self, flush_type: FlushType) -> Result<()> {
        self.flushing.store(true, Ordering::Release);

        let submitted = self.progress.last_submitted.load(Ordering::Acquire);
        {
            let mut info = self.flush_info.write();
            info.has_flush_occurred = true;
            info.flush_type = flush_type;
            info.last_flush_request_id = info.last_flush_request_id.max(submitted);
            info.last_request_id = self.session().last_request_id();
        }
        info!(pipeline = %self.identity, ?flush_type, last_submitted = submitted, "Flush started");

        let search = self.find_last_valid_request();
        self.flush_info.write().last_valid_request_id = search.as_ref().ok().copied().flatten();

        self.abort_config_done();
        search.map(|_| ())
    }

    /// Walk back from the last completed request, skipping requests in error,
    /// for at most the admitted queue depth.
    fn find_last_valid_request(&self) -> Result<Option<u64>> {
        let last_completed = self.progress.last_completed.load(Ordering::Acquire);
        if last_completed == INVALID_REQUEST_ID {
            debug!(pipeline = %self.identity, "No completed request before flush");
            return Ok(None);
        }

        let depth = u64::from(self.request_queue_depth()?);
        let lowest = last_completed.saturating_sub(depth).max(1);
        let found = (lowest..=last_completed)
            .rev()
            .find(|&request_id| !self.is_request_in_error(request_id));

        match found {
            Some(request_id) => {
                debug!(pipeline = %self.identity, request_id, "Last valid request before flush");
                Ok(Some(request_id))
            }
            None => {
                error!(pipeline = %self.identity, last_completed, depth, "No valid request found before flush");
                Err(ProtocolViolation::LastValidSearchExhausted {
                    last_completed,
                    depth,
                }
                .into())
            }
        }
    }

    /// Wake a stream-on blocked on config-done so it gives up.
    pub fn abort_config_done(&self) {
        let mut state = self.config_done.lock();
        if state.waiting {
            state.aborted = true;
            self.config_done_signal.notify_all();
            info!(pipeline = %self.identity, "Config done wait aborted");
        }
    }

    /// Cancel work still pending in nodes.
    ///
    /// Deferred requests are failed through the dependency queue; requests a
    /// node set up or is running are flushed by the node.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::InvalidState`](campipe_errors::SystemicError::InvalidState)
    /// before finalize.
    pub fn flush_pending_nodes(&self) -> Result<()> {
        let order = self.walk_forward_order()?;
        for request_id in self.pending_requests() {
            for index in order.iter() {
                let Some(node) = self.graph.node(index) else {
                    continue;
                };
                match node.request_status(request_id) {
                    NodeRequestStatus::Deferred => {
                        self.dependencies()
                            .notify_request_error(self.config.pipeline_index, request_id, node.id());
                    }
                    NodeRequestStatus::Setup | NodeRequestStatus::Running => node.flush(request_id),
                    _ => {}
                }
            }
        }
        Ok(())
    }

    /// Finish a flush, optionally asking the session for a generic recovery.
    pub fn end_flush(&self, trigger_recovery: bool) {
        if trigger_recovery {
            self.deliver(
                INVALID_REQUEST_ID,
                ResultPayload::Error(ErrorRecord::new(ErrorCode::Recovery, 0)),
            );
        }
        self.flushing.store(false, Ordering::Release);
        info!(pipeline = %self.identity, trigger_recovery, "Flush finished");
    }

    /// Raise the last flushed request id to at least `request_id`.
    pub fn update_last_flushed_request_id(&self, request_id: u64) {
        let mut info = self.flush_info.write();
        info.last_flush_request_id = info.last_flush_request_id.max(request_id);
    }

    /// Log every node that has not finished a pending request.
    pub fn log_pending_nodes(&self) {
        let Ok(order) = self.walk_forward_order() else {
            return;
        };
        for request_id in self.pending_requests() {
            let done = self
                .ring
                .owned(request_id)
                .map_or(0, |slot| slot.count(CompletionAxis::Output));
            for index in order.iter() {
                let Some(node) = self.graph.node(index) else {
                    continue;
                };
                let status = node.request_status(request_id);
                if status != NodeRequestStatus::Done {
                    info!(
                        pipeline = %self.identity,
                        request_id,
                        node = node.name(),
                        ?status,
                        unmet_dependency = node.has_unmet_dependency(request_id),
                        nodes_done = done,
                        "Node pending"
                    );
                }
            }
        }
    }

    /// Longest time a node still executing needs to honor a flush.
    #[must_use]
    pub fn flush_response_time(&self) -> Duration {
        self.graph
            .nodes()
            .iter()
            .filter(|node| node.is_processing())
            .map(|node| node.flush_response_time())
            .max()
            .unwrap_or_default()
    }

    /// Let nodes drop dependencies of completed requests. Streaming only.
    pub fn clear_pending_resources(&self) {
        if self.status.get() != PipelineStatus::StreamOn {
            return;
        }
        let last_completed = self.progress.last_completed.load(Ordering::Acquire);
        for node in self.graph.nodes() {
            node.clear_dependencies(last_completed);
        }
    }

    /// First pending request for which some node already submitted its
    /// hardware configuration.
    #[must_use]
    pub fn calculate_first_pending_request(&self) -> Option<u64> {
        self.pending_requests().find(|&request_id| {
            self.graph
                .nodes()
                .iter()
                .any(|node| node.request_status(request_id) == NodeRequestStatus::Submit)
        })
    }

    /// Invalidate metadata of the flushed window in every pool.
    pub fn flush_metadata(&self) {
        let info = self.flush_info();
        let after = info
            .last_valid_request_id
            .unwrap_or_else(|| self.progress.last_in_order_completed.load(Ordering::Acquire));
        let up_to = self.progress.last_completed.load(Ordering::Acquire);
        for (kind, pool) in self.pools() {
            debug!(pipeline = %self.identity, ?kind, after, up_to, "Flushing metadata pool");
            pool.flush(after, up_to);
        }
    }

    /// Requests in `(last_in_order_completed, last_submitted]`.
    pub(crate) fn pending_requests(&self) -> impl Iterator<Item = u64> + use<> {
        let first = self.progress.last_in_order_completed.load(Ordering::Acquire) + 1;
        let last = self.progress.last_submitted.load(Ordering::Acquire);
        first..=last
    }
}
