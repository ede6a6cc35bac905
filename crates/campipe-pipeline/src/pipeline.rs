//! The pipeline: construction, finalize, request admission and the
//! completion barrier.
//!
//! A [`Pipeline`] is shared by the session thread, node worker threads and
//! the hardware synchronization thread, so every method takes `&self`.
//! Lifecycle, flush, fence and sync-message handling live in their own
//! modules as further `impl Pipeline` blocks.

use campipe_errors::{ConfigError, ConstructionError, RequestError, Result, SystemicError};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::barrier::{AxisTargets, CompletionAxis, RequestRing, RequestSlot};
use crate::config::PipelineConfig;
use crate::dependency::DependencyQueue;
use crate::flush::FlushInfo;
use crate::graph::NodeGraph;
use crate::hardware::HardwareLink;
use crate::lifecycle::{ConfigDoneState, PipelineStatus, StatusCell, StreamOnWait};
use crate::metadata::{MetadataPool, PoolKind, TuningData};
use crate::negotiation::{BufferProperties, NegotiationOrder, NegotiationOutcome, negotiate};
use crate::node::Node;
use crate::session::{ErrorCode, ErrorRecord, ResultPayload, ResultRecord, Session};
use crate::types::{CaptureRequest, INVALID_REQUEST_ID, NodeId, SyncMode};
use crate::validation::GraphValidator;

/// External collaborators handed to the pipeline at creation.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Owning session
    pub session: Arc<dyn Session>,
    /// Deferred dependency queue
    pub dependencies: Arc<dyn DependencyQueue>,
    /// Hardware link, required for realtime pipelines
    pub hardware: Option<Arc<dyn HardwareLink>>,
    /// Metadata pools exposed to nodes
    pub pools: BTreeMap<PoolKind, Arc<dyn MetadataPool>>,
    /// Tuning data exposed to nodes
    pub tuning: Option<Arc<dyn TuningData>>,
}

impl Collaborators {
    /// Collaborators without hardware, pools or tuning data.
    #[must_use]
    pub fn new(session: Arc<dyn Session>, dependencies: Arc<dyn DependencyQueue>) -> Self {
        Self {
            session,
            dependencies,
            hardware: None,
            pools: BTreeMap::new(),
            tuning: None,
        }
    }

    /// Attach a hardware link.
    #[must_use]
    pub fn with_hardware(mut self, hardware: Arc<dyn HardwareLink>) -> Self {
        self.hardware = Some(hardware);
        self
    }

    /// Attach a metadata pool.
    #[must_use]
    pub fn with_pool(mut self, kind: PoolKind, pool: Arc<dyn MetadataPool>) -> Self {
        self.pools.insert(kind, pool);
        self
    }

    /// Attach tuning data.
    #[must_use]
    pub fn with_tuning(mut self, tuning: Arc<dyn TuningData>) -> Self {
        self.tuning = Some(tuning);
        self
    }
}

/// Values computed once by [`Pipeline::finalize`].
#[derive(Debug)]
pub(crate) struct Finalized {
    pub negotiation: NegotiationOutcome,
    pub targets: AxisTargets,
    pub request_queue_depth: u32,
    pub max_pipeline_delay: u32,
    pub frame_delay: u32,
    pub extra_buffer_count: u32,
    pub meta_buffer_delay: u32,
}

/// Request ids tracked across the stream cycle.
#[derive(Debug, Default)]
pub(crate) struct RequestProgress {
    /// Highest request admitted by `process_request`
    pub last_submitted: AtomicU64,
    /// Highest request whose output axis completed
    pub last_completed: AtomicU64,
    /// Highest request such that it and all earlier ones completed
    pub last_in_order_completed: AtomicU64,
    /// Request of the last shutter sent
    pub last_shutter: AtomicU64,
    /// Session's last request id at the previous stream-off
    pub last_request_id: AtomicU64,
}

#[derive(Debug, Default)]
struct SyncEntry {
    sync_id: AtomicU64,
    request_id: AtomicU64,
}

/// One camera pipeline instance.
#[derive(Debug)]
pub struct Pipeline {
    pub(crate) config: PipelineConfig,
    pub(crate) identity: String,
    pub(crate) graph: NodeGraph,
    pub(crate) finalized: OnceLock<Finalized>,
    pub(crate) ring: RequestRing,
    sync_map: Box<[SyncEntry]>,
    pub(crate) status: StatusCell,
    collaborators: Collaborators,
    pub(crate) progress: RequestProgress,
    pub(crate) flushing: AtomicBool,
    pub(crate) flush_info: RwLock<FlushInfo>,
    pub(crate) triggering_recovery: AtomicBool,
    pub(crate) initial_config_pending: AtomicBool,
    pub(crate) config_done: Mutex<ConfigDoneState>,
    pub(crate) config_done_signal: Condvar,
    pub(crate) stream_on_wait: Mutex<StreamOnWait>,
    pub(crate) stream_on_signal: Condvar,
    nodes_done: Mutex<()>,
    nodes_done_signal: Condvar,
    pub(crate) resource_lock: Mutex<()>,
    pub(crate) invalid_sof_count: AtomicU32,
    pub(crate) shutter_violations: AtomicU64,
    pub(crate) fence_leaks: AtomicU64,
    references: AtomicU32,
}

impl Pipeline {
    /// Create a pipeline over `graph`.
    ///
    /// The pipeline starts `Initialized`; call [`finalize`](Self::finalize)
    /// before submitting requests.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid configuration or a realtime
    /// pipeline without a hardware link.
    pub fn create(config: PipelineConfig, graph: NodeGraph, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;
        if config.realtime && collaborators.hardware.is_none() {
            return Err(ConfigError::invalid("hardware", "realtime pipeline needs a hardware link").into());
        }

        let identity = config.identity();
        let capacity = config.ring_capacity();
        let sync_map = (0..capacity.max(1)).map(|_| SyncEntry::default()).collect();

        let pipeline = Self {
            ring: RequestRing::new(capacity),
            sync_map,
            graph,
            finalized: OnceLock::new(),
            status: StatusCell::default(),
            collaborators,
            progress: RequestProgress::default(),
            flushing: AtomicBool::new(false),
            flush_info: RwLock::new(FlushInfo::default()),
            triggering_recovery: AtomicBool::new(false),
            initial_config_pending: AtomicBool::new(config.realtime),
            config_done: Mutex::new(ConfigDoneState::default()),
            config_done_signal: Condvar::new(),
            stream_on_wait: Mutex::new(StreamOnWait::default()),
            stream_on_signal: Condvar::new(),
            nodes_done: Mutex::new(()),
            nodes_done_signal: Condvar::new(),
            resource_lock: Mutex::new(()),
            invalid_sof_count: AtomicU32::new(0),
            shutter_violations: AtomicU64::new(0),
            fence_leaks: AtomicU64::new(0),
            references: AtomicU32::new(1),
            identity,
            config,
        };
        pipeline.status.set(PipelineStatus::Initialized, &pipeline.identity);
        debug!(pipeline = %pipeline.identity, nodes = pipeline.graph.node_count(), "Pipeline created");
        Ok(pipeline)
    }

    /// Validate the graph, negotiate buffers and compute derived values.
    ///
    /// # Errors
    ///
    /// - [`ConstructionError::AlreadyFinalized`] on a second call
    /// - any validation or negotiation failure
    pub fn finalize(&self) -> Result<()> {
        if self.status.get() != PipelineStatus::Initialized || self.finalized.get().is_some() {
            return Err(ConstructionError::AlreadyFinalized {
                pipeline: self.identity.clone(),
            }
            .into());
        }

        GraphValidator::new().validate(&self.graph).inspect_err(|err| {
            error!(pipeline = %self.identity, error = %err, "Graph validation failed");
        })?;
        let negotiation = negotiate(&self.graph, &self.identity)?;

        let nodes = self.graph.nodes();
        let count = |pred: fn(&dyn Node) -> bool| {
            nodes.iter().filter(|node| pred(node.as_ref())).count() as u32
        };
        let targets = AxisTargets {
            output: nodes.len() as u32,
            metadata: nodes.len() as u32,
            partial_metadata: count(|node| node.reports_partial_metadata()),
            config: count(|node| node.submits_config()),
        };

        let finalized = Finalized {
            negotiation,
            targets,
            request_queue_depth: self.config.request_queue_depth(),
            max_pipeline_delay: self.config.max_pipeline_delay(),
            frame_delay: self.config.frame_delay,
            extra_buffer_count: self.config.extra_framework_buffers,
            meta_buffer_delay: self.config.meta_buffer_delay(),
        };

        for pool in self.collaborators.pools.values() {
            pool.set_depth(self.ring.capacity());
        }

        let depth = finalized.request_queue_depth;
        let delay = finalized.max_pipeline_delay;
        let meta_buffer_delay = finalized.meta_buffer_delay;
        let extra_buffers = finalized.extra_buffer_count;
        self.finalized.set(finalized).map_err(|_| ConstructionError::AlreadyFinalized {
            pipeline: self.identity.clone(),
        })?;
        self.status.set(PipelineStatus::Finalized, &self.identity);

        info!(
            pipeline = %self.identity,
            depth,
            max_pipeline_delay = delay,
            meta_buffer_delay,
            extra_buffers,
            output = targets.output,
            partial_metadata = targets.partial_metadata,
            config = targets.config,
            "Pipeline finalized"
        );
        Ok(())
    }

    fn finalized(&self) -> Result<&Finalized> {
        self.finalized.get().ok_or_else(|| {
            SystemicError::InvalidState {
                operation: "access finalized pipeline",
                state: self.status.get().description(),
            }
            .into()
        })
    }

    /// Open a hardware request ahead of submission.
    ///
    /// No-op for offline pipelines, and for the first request of a stream
    /// cycle whose configuration is applied at stream-on.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Cancelled`] while flushing
    /// - [`SystemicError::Hardware`] if the hardware rejects the request
    pub fn open_request(&self, request_id: u64, sync_id: u64, mode: SyncMode, exposure_timeout_ms: u32) -> Result<()> {
        let Some(hardware) = self.hardware() else {
            return Ok(());
        };

        if self.initial_config_pending.load(Ordering::Acquire) && self.status.get() != PipelineStatus::StreamOn {
            self.initial_config_pending.store(false, Ordering::Release);
            debug!(pipeline = %self.identity, request_id, "Initial config applied at stream on");
            return Ok(());
        }
        if self.is_flushing() {
            return Err(RequestError::cancelled(request_id).into());
        }

        hardware
            .open_request(request_id, sync_id, mode, exposure_timeout_ms)
            .map_err(|code| {
                error!(pipeline = %self.identity, request_id, sync_id, %code, "Open request failed");
                SystemicError::Hardware {
                    operation: "open request",
                    code,
                }
                .into()
            })
    }

    /// Admit a capture request.
    ///
    /// Claims the request's slot, acquires resources if needed, sets up every
    /// node in walk-forward order and hands the enabled ones to the
    /// dependency queue, or flushes them while a flush is in progress.
    ///
    /// # Errors
    ///
    /// - [`RequestError::NoNodesEnabled`] if no node took part
    /// - [`RequestError::Rejected`] if a node failed to set up
    /// - resource acquisition failures
    pub fn process_request(&self, request: &CaptureRequest) -> Result<()> {
        let finalized = self.finalized()?;
        let request_id = request.request_id;

        let (slot, leak) = self.ring.claim(request, self.config.batch_frame_interval_ns());
        if let Some(violation) = leak {
            self.fence_leaks.fetch_add(1, Ordering::Relaxed);
            error!(pipeline = %self.identity, request_id, error = %violation, "Slot reused with pending fences");
        }
        let Some(slot) = slot else {
            return Err(SystemicError::InvalidState {
                operation: "claim request slot",
                state: self.status.get().description(),
            }
            .into());
        };

        self.record_sync_id(request.sync_id, request_id);
        self.progress.last_submitted.fetch_max(request_id, Ordering::AcqRel);

        if matches!(self.status.get(), PipelineStatus::Finalized | PipelineStatus::ResourcesReleased) {
            self.acquire_resources()?;
        }

        let mut enabled = Vec::with_capacity(self.graph.node_count());
        let mut skipped = Vec::new();
        for index in finalized.negotiation.order.iter() {
            let Some(node) = self.graph.node(index) else {
                continue;
            };
            match node.setup_request(request) {
                Ok(true) => enabled.push(node),
                Ok(false) => {
                    trace!(pipeline = %self.identity, request_id, node = node.name(), "Node skipped");
                    skipped.push(node);
                }
                Err(code) => {
                    error!(pipeline = %self.identity, request_id, node = node.name(), %code, "Node setup failed");
                    self.trigger_request_error(slot, request_id);
                    return Err(RequestError::Rejected {
                        request_id,
                        node: node.name().to_string(),
                        code,
                    }
                    .into());
                }
            }
        }

        let flushing = self.is_flushing();
        if enabled.is_empty() {
            if flushing {
                self.trigger_request_error(slot, request_id);
            }
            warn!(pipeline = %self.identity, request_id, flushing, "No node enabled for request");
            return Err(RequestError::NoNodesEnabled { request_id }.into());
        }

        // Axis targets count every node, so a skipped node completes its axes
        // here instead of reporting later.
        for node in &skipped {
            self.complete_skipped(node.as_ref(), request_id)?;
        }

        for node in &enabled {
            if flushing {
                node.flush(request_id);
            } else {
                self.collaborators
                    .dependencies
                    .add_deferred_node(self.config.pipeline_index, request_id, node.id());
            }
        }
        if !flushing {
            self.collaborators.dependencies.dispatch_ready_nodes();
        }

        if !self.config.realtime {
            slot.set_capture_timestamp(request.input_timestamp);
            self.emit_shutter(slot, request_id);
        }

        trace!(pipeline = %self.identity, request_id, enabled = enabled.len(), "Request admitted");
        Ok(())
    }

    /// Report that `node` finished `request_id` on `axis`.
    ///
    /// The one caller that makes the axis counter reach its target runs the
    /// axis action: in-order tracking for output, metadata publication, early
    /// metadata delivery, or a config-done wake-up.
    ///
    /// # Errors
    ///
    /// Returns a [`ProtocolViolation::StaleSlot`](campipe_errors::ProtocolViolation::StaleSlot)
    /// if the request's slot was already reused; no counter is touched.
    pub fn notify_node_completion(&self, node: NodeId, request_id: u64, axis: CompletionAxis) -> Result<()> {
        let targets = self.finalized()?.targets;
        let slot = self.ring.owned(request_id).inspect_err(|err| {
            error!(pipeline = %self.identity, %node, request_id, axis = axis.as_str(), error = %err, "Completion for reused slot");
        })?;

        if !slot.complete(axis, targets.get(axis)) {
            return Ok(());
        }

        trace!(pipeline = %self.identity, %node, request_id, axis = axis.as_str(), "Axis complete");
        match axis {
            CompletionAxis::Output => self.on_all_nodes_done(request_id),
            CompletionAxis::Metadata => self.on_metadata_done(slot, request_id),
            CompletionAxis::PartialMetadata => self.on_partial_metadata_done(slot, request_id),
            CompletionAxis::Config => self.on_config_done(),
        }
        Ok(())
    }

    fn complete_skipped(&self, node: &dyn Node, request_id: u64) -> Result<()> {
        let id = node.id();
        if node.submits_config() {
            self.notify_node_completion(id, request_id, CompletionAxis::Config)?;
        }
        if node.reports_partial_metadata() {
            self.notify_node_completion(id, request_id, CompletionAxis::PartialMetadata)?;
        }
        self.notify_node_completion(id, request_id, CompletionAxis::Metadata)?;
        self.notify_node_completion(id, request_id, CompletionAxis::Output)
    }

    /// `node` produced every output of `request_id`.
    ///
    /// # Errors
    ///
    /// See [`notify_node_completion`](Self::notify_node_completion).
    pub fn notify_node_request_done(&self, node: NodeId, request_id: u64) -> Result<()> {
        self.notify_node_completion(node, request_id, CompletionAxis::Output)
    }

    /// `node` published its metadata for `request_id`.
    ///
    /// # Errors
    ///
    /// See [`notify_node_completion`](Self::notify_node_completion).
    pub fn notify_node_metadata_done(&self, node: NodeId, request_id: u64) -> Result<()> {
        self.notify_node_completion(node, request_id, CompletionAxis::Metadata)
    }

    /// `node` published its partial metadata for `request_id`.
    ///
    /// # Errors
    ///
    /// See [`notify_node_completion`](Self::notify_node_completion).
    pub fn notify_node_partial_metadata_done(&self, node: NodeId, request_id: u64) -> Result<()> {
        self.notify_node_completion(node, request_id, CompletionAxis::PartialMetadata)
    }

    /// `node` submitted its hardware configuration for `request_id`.
    ///
    /// # Errors
    ///
    /// See [`notify_node_completion`](Self::notify_node_completion).
    pub fn notify_node_config_done(&self, node: NodeId, request_id: u64) -> Result<()> {
        self.notify_node_completion(node, request_id, CompletionAxis::Config)
    }

    fn on_all_nodes_done(&self, request_id: u64) {
        let progress = &self.progress;
        progress.last_completed.fetch_max(request_id, Ordering::AcqRel);
        let submitted = progress.last_submitted.load(Ordering::Acquire);

        if self.is_flushing() {
            let targets = self.axis_targets().unwrap_or_default();
            let mut in_order = progress.last_in_order_completed.load(Ordering::Acquire);
            while in_order < submitted {
                let next = in_order + 1;
                let done = self
                    .ring
                    .owned(next)
                    .is_ok_and(|slot| slot.count(CompletionAxis::Output) >= targets.output);
                if !done {
                    break;
                }
                in_order = next;
            }
            progress.last_in_order_completed.fetch_max(in_order, Ordering::AcqRel);
            if in_order == submitted {
                self.session().processing_done(self.config.pipeline_index, in_order);
            }
        } else {
            progress.last_in_order_completed.fetch_max(request_id, Ordering::AcqRel);
            self.session().processing_done(self.config.pipeline_index, request_id);
        }

        if progress.last_completed.load(Ordering::Acquire) >= submitted {
            let _guard = self.nodes_done.lock();
            self.nodes_done_signal.notify_all();
        }
    }

    fn on_metadata_done(&self, slot: &RequestSlot, request_id: u64) {
        if self.is_request_in_error(request_id) {
            slot.claim_metadata_ready();
            self.publish_error_metadata(slot, request_id);
            return;
        }
        if slot.claim_metadata_ready() {
            trace!(pipeline = %self.identity, request_id, "Metadata ready, shutter outstanding");
        } else {
            self.publish_metadata(slot, request_id);
        }
    }

    fn on_partial_metadata_done(&self, slot: &RequestSlot, request_id: u64) {
        if !self.config.partial_metadata_enabled || self.is_request_in_error(request_id) {
            return;
        }
        for &sequence_id in &slot.frame().sequence_ids {
            self.deliver(request_id, ResultPayload::PartialMetadata { sequence_id });
        }
    }

    fn on_config_done(&self) {
        let mut state = self.config_done.lock();
        state.count = state.count.saturating_add(1);
        self.config_done_signal.notify_all();
    }

    /// Publish full metadata for every batched frame of the request.
    pub(crate) fn publish_metadata(&self, slot: &RequestSlot, request_id: u64) {
        let frame = slot.frame();
        for (index, &sequence_id) in frame.sequence_ids.iter().enumerate() {
            self.deliver(
                request_id,
                ResultPayload::Metadata {
                    sequence_id,
                    timestamp: frame.timestamp_of(index),
                },
            );
        }
        debug!(pipeline = %self.identity, request_id, "Metadata published");
    }

    pub(crate) fn publish_error_metadata(&self, slot: &RequestSlot, request_id: u64) {
        for &sequence_id in &slot.frame().sequence_ids {
            self.deliver(request_id, ResultPayload::Error(ErrorRecord::new(ErrorCode::Result, sequence_id)));
        }
        info!(pipeline = %self.identity, request_id, "Error metadata published");
    }

    /// Metadata buffers of `request_id` may be reused by the session.
    ///
    /// # Errors
    ///
    /// Returns a stale-slot violation if the slot was reused.
    pub fn process_metadata_buffer_done(&self, request_id: u64) -> Result<()> {
        let slot = self.ring.owned(request_id)?;
        let sequence_id = slot.frame().first_sequence_id();
        self.deliver(request_id, ResultPayload::MetaBufferDone { sequence_id });
        Ok(())
    }

    /// Report a whole-request failure for every batched frame.
    pub(crate) fn trigger_request_error(&self, slot: &RequestSlot, request_id: u64) {
        for &sequence_id in &slot.frame().sequence_ids {
            self.deliver(request_id, ResultPayload::Error(ErrorRecord::new(ErrorCode::Request, sequence_id)));
        }
    }

    /// Report a whole-request failure for `request_id`.
    ///
    /// # Errors
    ///
    /// Returns a stale-slot violation if the slot was reused.
    pub fn report_request_error(&self, request_id: u64) -> Result<()> {
        let slot = self.ring.owned(request_id)?;
        self.trigger_request_error(slot, request_id);
        Ok(())
    }

    /// Block until every submitted request completed on the output axis.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::AllNodesDoneTimeout`] when the bound expires.
    pub fn wait_for_all_nodes_request(&self) -> Result<()> {
        let timeout = self.config.all_nodes_done_timeout;
        let deadline = Instant::now() + timeout;
        let mut guard = self.nodes_done.lock();
        loop {
            let completed = self.progress.last_completed.load(Ordering::Acquire);
            let submitted = self.progress.last_submitted.load(Ordering::Acquire);
            if completed >= submitted {
                return Ok(());
            }
            if self.nodes_done_signal.wait_until(&mut guard, deadline).timed_out() {
                let completed = self.progress.last_completed.load(Ordering::Acquire);
                let submitted = self.progress.last_submitted.load(Ordering::Acquire);
                if completed >= submitted {
                    return Ok(());
                }
                warn!(pipeline = %self.identity, completed, submitted, "Timed out waiting for all nodes");
                return Err(SystemicError::AllNodesDoneTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                    last_completed: completed,
                    last_submitted: submitted,
                }
                .into());
            }
        }
    }

    pub(crate) fn deliver(&self, request_id: u64, payload: ResultPayload) {
        self.session().deliver(ResultRecord {
            pipeline_index: self.config.pipeline_index,
            request_id,
            payload,
        });
    }

    fn record_sync_id(&self, sync_id: u64, request_id: u64) {
        let len = self.sync_map.len() as u64;
        if let Some(entry) = self.sync_map.get((sync_id % len.max(1)) as usize) {
            entry.request_id.store(request_id, Ordering::Release);
            entry.sync_id.store(sync_id, Ordering::Release);
        }
    }

    /// Request admitted with `sync_id`, or [`INVALID_REQUEST_ID`].
    #[must_use]
    pub fn request_for_sync_id(&self, sync_id: u64) -> u64 {
        let len = self.sync_map.len() as u64;
        self.sync_map
            .get((sync_id % len.max(1)) as usize)
            .filter(|entry| entry.sync_id.load(Ordering::Acquire) == sync_id)
            .map_or(INVALID_REQUEST_ID, |entry| entry.request_id.load(Ordering::Acquire))
    }

    /// Take a reference on the pipeline. Returns the new count.
    pub fn add_reference(&self) -> u32 {
        self.references.fetch_add(1, Ordering::AcqRel).wrapping_add(1)
    }

    /// Drop a reference. Returns the remaining count.
    pub fn release_reference(&self) -> u32 {
        let previous = self
            .references
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| count.checked_sub(1))
            .unwrap_or_default();
        previous.saturating_sub(1)
    }

    /// Current reference count.
    #[must_use]
    pub fn references(&self) -> u32 {
        self.references.load(Ordering::Acquire)
    }

    // Accessors for nodes and the session.

    /// Log identity: `{name}_{pipeline_id}_cam_{camera_id}`.
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Configuration the pipeline was created with.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        self.status.get()
    }

    /// The node graph.
    #[must_use]
    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    /// Whether `finalize` succeeded.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.finalized.get().is_some()
    }

    /// Admitted request-queue depth.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::InvalidState`] before finalize.
    pub fn request_queue_depth(&self) -> Result<u32> {
        Ok(self.finalized()?.request_queue_depth)
    }

    /// Maximum pipeline delay in frames.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::InvalidState`] before finalize.
    pub fn max_pipeline_delay(&self) -> Result<u32> {
        Ok(self.finalized()?.max_pipeline_delay)
    }

    /// Frame delay published by the use case.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::InvalidState`] before finalize.
    pub fn frame_delay(&self) -> Result<u32> {
        Ok(self.finalized()?.frame_delay)
    }

    /// Extra framework buffers to provision on top of the queue depth.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::InvalidState`] before finalize.
    pub fn extra_buffer_count(&self) -> Result<u32> {
        Ok(self.finalized()?.extra_buffer_count)
    }

    /// Frames a metadata buffer stays referenced after its request.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::InvalidState`] before finalize.
    pub fn meta_buffer_delay(&self) -> Result<u32> {
        Ok(self.finalized()?.meta_buffer_delay)
    }

    /// Per-axis completion targets.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::InvalidState`] before finalize.
    pub fn axis_targets(&self) -> Result<AxisTargets> {
        Ok(self.finalized()?.targets)
    }

    /// Walk-forward node order.
    ///
    /// # Errors
    ///
    /// Returns [`SystemicError::InvalidState`] before finalize.
    pub fn walk_forward_order(&self) -> Result<&NegotiationOrder> {
        Ok(&self.finalized()?.negotiation.order)
    }

    /// Negotiated output properties of node `id`.
    #[must_use]
    pub fn buffer_properties(&self, id: NodeId) -> Option<BufferProperties> {
        let index = self.graph.index_of(id)?;
        self.finalized.get()?.negotiation.properties_of(index).copied()
    }

    /// Whether negotiation needed the fallback format.
    #[must_use]
    pub fn renegotiated(&self) -> bool {
        self.finalized.get().is_some_and(|f| f.negotiation.renegotiated)
    }

    /// Metadata pool of `kind`, if provided.
    #[must_use]
    pub fn metadata_pool(&self, kind: PoolKind) -> Option<&Arc<dyn MetadataPool>> {
        self.collaborators.pools.get(&kind)
    }

    /// Tuning data, if provided.
    #[must_use]
    pub fn tuning_data(&self) -> Option<&Arc<dyn TuningData>> {
        self.collaborators.tuning.as_ref()
    }

    /// Whether the dependency queue marked `request_id` failed.
    #[must_use]
    pub fn is_request_in_error(&self, request_id: u64) -> bool {
        self.collaborators
            .dependencies
            .is_request_in_error(self.config.pipeline_index, request_id)
    }

    /// Whether `request_id` still owns its slot.
    #[must_use]
    pub fn is_request_live(&self, request_id: u64) -> bool {
        request_id != INVALID_REQUEST_ID && self.ring.owned(request_id).is_ok()
    }

    pub(crate) fn session(&self) -> &dyn Session {
        self.collaborators.session.as_ref()
    }

    pub(crate) fn dependencies(&self) -> &dyn DependencyQueue {
        self.collaborators.dependencies.as_ref()
    }

    pub(crate) fn hardware(&self) -> Option<&dyn HardwareLink> {
        if self.config.realtime {
            self.collaborators.hardware.as_deref()
        } else {
            None
        }
    }

    pub(crate) fn pools(&self) -> impl Iterator<Item = (&PoolKind, &Arc<dyn MetadataPool>)> {
        self.collaborators.pools.iter()
    }
}
