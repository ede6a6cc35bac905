//! Mock collaborators for pipeline tests.
//!
//! Every mock is `Send + Sync`, guards its state with `parking_lot` locks and
//! records the calls it receives so tests can assert on them afterwards.

use campipe_errors::{CodeResult, ResultCode};
use campipe_pipeline::dependency::DependencyQueue;
use campipe_pipeline::fence::FenceHandle;
use campipe_pipeline::graph::NodeGraph;
use campipe_pipeline::hardware::HardwareLink;
use campipe_pipeline::lifecycle::DeactivateMode;
use campipe_pipeline::message::FrameMessage;
use campipe_pipeline::metadata::{MetadataPool, TuningData};
use campipe_pipeline::negotiation::BufferRequirement;
use campipe_pipeline::node::{Node, NodeRequestStatus};
use campipe_pipeline::session::{ErrorRecord, ResultPayload, ResultRecord, Session};
use campipe_pipeline::types::{Format, NodeId, SyncMode};
use campipe_pipeline::{Collaborators, Pipeline, PipelineConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// A call a [`MockNode`] received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCall {
    /// `acquire_resources`
    Acquire,
    /// `release_resources` with the mode bits
    Release(u32),
    /// `on_stream_on`
    StreamOn,
    /// `on_stream_off` with the mode bits
    StreamOff(u32),
    /// `setup_request`
    Setup(u64),
    /// `flush`
    Flush(u64),
    /// `clear_dependencies`
    ClearDependencies(u64),
    /// `notify_frame` with the sync id
    Frame(u64),
    /// `reset_negotiation`
    ResetNegotiation,
}

/// Configurable node.
#[derive(Debug)]
pub struct MockNode {
    id: NodeId,
    name: String,
    partial_metadata: bool,
    config: bool,
    enabled: bool,
    fail_acquire: Option<ResultCode>,
    fail_setup: Option<ResultCode>,
    fail_stream_on: Option<ResultCode>,
    rejected_format: Option<Format>,
    flush_response: Duration,
    processing: AtomicBool,
    statuses: Mutex<HashMap<u64, NodeRequestStatus>>,
    calls: Mutex<Vec<NodeCall>>,
}

impl MockNode {
    /// Node with type id `type_id`, instance 0.
    pub fn new(type_id: u32, name: &str) -> Self {
        Self {
            id: NodeId::new(type_id, 0),
            name: name.to_string(),
            partial_metadata: false,
            config: false,
            enabled: true,
            fail_acquire: None,
            fail_setup: None,
            fail_stream_on: None,
            rejected_format: None,
            flush_response: Duration::ZERO,
            processing: AtomicBool::new(false),
            statuses: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Report partial metadata.
    #[must_use]
    pub fn with_partial_metadata(mut self) -> Self {
        self.partial_metadata = true;
        self
    }

    /// Submit hardware configuration per request.
    #[must_use]
    pub fn with_config(mut self) -> Self {
        self.config = true;
        self
    }

    /// Decline every request at setup.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Fail `acquire_resources` with `code`.
    #[must_use]
    pub fn failing_acquire(mut self, code: ResultCode) -> Self {
        self.fail_acquire = Some(code);
        self
    }

    /// Fail `setup_request` with `code`.
    #[must_use]
    pub fn failing_setup(mut self, code: ResultCode) -> Self {
        self.fail_setup = Some(code);
        self
    }

    /// Fail `on_stream_on` with `code`.
    #[must_use]
    pub fn failing_stream_on(mut self, code: ResultCode) -> Self {
        self.fail_stream_on = Some(code);
        self
    }

    /// Refuse to negotiate outputs in `format`.
    #[must_use]
    pub fn rejecting_format(mut self, format: Format) -> Self {
        self.rejected_format = Some(format);
        self
    }

    /// Report as executing, needing `response` to honor a flush.
    #[must_use]
    pub fn processing_for(self, response: Duration) -> Self {
        self.processing.store(true, Ordering::Release);
        Self {
            flush_response: response,
            ..self
        }
    }

    /// Node id.
    pub fn node_id(&self) -> NodeId {
        self.id
    }

    /// Set the status reported for `request_id`.
    pub fn set_status(&self, request_id: u64, status: NodeRequestStatus) {
        self.statuses.lock().insert(request_id, status);
    }

    /// Calls received so far.
    pub fn calls(&self) -> Vec<NodeCall> {
        self.calls.lock().clone()
    }

    /// Number of calls equal to `call`.
    pub fn count(&self, call: NodeCall) -> usize {
        self.calls.lock().iter().filter(|c| **c == call).count()
    }

    fn record(&self, call: NodeCall) {
        self.calls.lock().push(call);
    }
}

impl Node for MockNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn reports_partial_metadata(&self) -> bool {
        self.partial_metadata
    }

    fn submits_config(&self) -> bool {
        self.config
    }

    fn input_requirement(&self, output: &BufferRequirement) -> CodeResult<BufferRequirement> {
        if self.rejected_format == Some(output.format) {
            return Err(ResultCode::Unsupported);
        }
        Ok(*output)
    }

    fn reset_negotiation(&self) {
        self.record(NodeCall::ResetNegotiation);
    }

    fn acquire_resources(&self) -> CodeResult {
        self.record(NodeCall::Acquire);
        self.fail_acquire.map_or(Ok(()), Err)
    }

    fn release_resources(&self, mode: DeactivateMode) -> CodeResult {
        self.record(NodeCall::Release(mode.bits()));
        Ok(())
    }

    fn on_stream_on(&self) -> CodeResult {
        self.record(NodeCall::StreamOn);
        self.fail_stream_on.map_or(Ok(()), Err)
    }

    fn on_stream_off(&self, mode: DeactivateMode) -> CodeResult {
        self.record(NodeCall::StreamOff(mode.bits()));
        Ok(())
    }

    fn setup_request(&self, request: &campipe_pipeline::CaptureRequest) -> CodeResult<bool> {
        self.record(NodeCall::Setup(request.request_id));
        if let Some(code) = self.fail_setup {
            return Err(code);
        }
        if self.enabled {
            self.statuses.lock().insert(request.request_id, NodeRequestStatus::Setup);
        }
        Ok(self.enabled)
    }

    fn request_status(&self, request_id: u64) -> NodeRequestStatus {
        self.statuses.lock().get(&request_id).copied().unwrap_or_default()
    }

    fn flush(&self, request_id: u64) {
        self.record(NodeCall::Flush(request_id));
    }

    fn clear_dependencies(&self, last_completed: u64) {
        self.record(NodeCall::ClearDependencies(last_completed));
    }

    fn notify_frame(&self, message: &FrameMessage) {
        self.record(NodeCall::Frame(message.sync_id));
    }

    fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    fn flush_response_time(&self) -> Duration {
        self.flush_response
    }
}

/// Session that records everything it is told.
#[derive(Debug)]
pub struct RecordingSession {
    records: Mutex<Vec<ResultRecord>>,
    done: Mutex<Vec<u64>>,
    last_request_id: AtomicU64,
    pending_results: AtomicBool,
    live_requests: AtomicU32,
}

impl Default for RecordingSession {
    fn default() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            done: Mutex::new(Vec::new()),
            last_request_id: AtomicU64::new(0),
            pending_results: AtomicBool::new(true),
            live_requests: AtomicU32::new(1),
        }
    }
}

impl RecordingSession {
    /// Every record delivered.
    pub fn records(&self) -> Vec<ResultRecord> {
        self.records.lock().clone()
    }

    /// Number of records of `kind` (see [`ResultPayload::kind`]).
    pub fn count(&self, kind: &str) -> usize {
        self.records.lock().iter().filter(|r| r.payload.kind() == kind).count()
    }

    /// Number of records of `kind` for `request_id`.
    pub fn count_for(&self, request_id: u64, kind: &str) -> usize {
        self.records
            .lock()
            .iter()
            .filter(|r| r.request_id == request_id && r.payload.kind() == kind)
            .count()
    }

    /// Request ids of shutters, in delivery order.
    pub fn shutter_requests(&self) -> Vec<u64> {
        self.records
            .lock()
            .iter()
            .filter(|r| matches!(r.payload, ResultPayload::Shutter { .. }))
            .map(|r| r.request_id)
            .collect()
    }

    /// Error records, in delivery order.
    pub fn errors(&self) -> Vec<(u64, ErrorRecord)> {
        self.records
            .lock()
            .iter()
            .filter_map(|r| match r.payload {
                ResultPayload::Error(err) => Some((r.request_id, err)),
                _ => None,
            })
            .collect()
    }

    /// Requests reported by `processing_done`.
    pub fn done(&self) -> Vec<u64> {
        self.done.lock().clone()
    }

    /// Drop recorded records.
    pub fn clear(&self) {
        self.records.lock().clear();
        self.done.lock().clear();
    }

    /// Set the value returned by `last_request_id`.
    pub fn set_last_request_id(&self, request_id: u64) {
        self.last_request_id.store(request_id, Ordering::Release);
    }

    /// Set the value returned by `has_pending_results`.
    pub fn set_pending_results(&self, pending: bool) {
        self.pending_results.store(pending, Ordering::Release);
    }

    /// Set the value returned by `live_pending_requests`.
    pub fn set_live_requests(&self, live: u32) {
        self.live_requests.store(live, Ordering::Release);
    }
}

impl Session for RecordingSession {
    fn deliver(&self, record: ResultRecord) {
        self.records.lock().push(record);
    }

    fn processing_done(&self, _pipeline_index: u32, request_id: u64) {
        self.done.lock().push(request_id);
    }

    fn last_request_id(&self) -> u64 {
        self.last_request_id.load(Ordering::Acquire)
    }

    fn has_pending_results(&self) -> bool {
        self.pending_results.load(Ordering::Acquire)
    }

    fn live_pending_requests(&self) -> u32 {
        self.live_requests.load(Ordering::Acquire)
    }
}

/// Dependency queue that records what it is asked to do.
#[derive(Debug, Default)]
pub struct MockDependencyQueue {
    in_error: Mutex<HashSet<u64>>,
    deferred: Mutex<Vec<(u64, NodeId)>>,
    signaled: Mutex<Vec<(FenceHandle, u64)>>,
    failed: Mutex<Vec<(FenceHandle, u64, bool)>>,
    request_errors: Mutex<Vec<(u64, NodeId)>>,
    dispatches: AtomicUsize,
}

impl MockDependencyQueue {
    /// Mark `request_id` failed.
    pub fn mark_in_error(&self, request_id: u64) {
        self.in_error.lock().insert(request_id);
    }

    /// Nodes queued so far.
    pub fn deferred(&self) -> Vec<(u64, NodeId)> {
        self.deferred.lock().clone()
    }

    /// Fences reported signaled.
    pub fn signaled(&self) -> Vec<(FenceHandle, u64)> {
        self.signaled.lock().clone()
    }

    /// Fences reported failed, with the flushing flag.
    pub fn failed(&self) -> Vec<(FenceHandle, u64, bool)> {
        self.failed.lock().clone()
    }

    /// Deferred nodes failed during flush.
    pub fn request_errors(&self) -> Vec<(u64, NodeId)> {
        self.request_errors.lock().clone()
    }

    /// Times `dispatch_ready_nodes` ran.
    pub fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::Acquire)
    }
}

impl DependencyQueue for MockDependencyQueue {
    fn is_request_in_error(&self, _pipeline_index: u32, request_id: u64) -> bool {
        self.in_error.lock().contains(&request_id)
    }

    fn fence_signaled(&self, _pipeline_index: u32, fence: FenceHandle, request_id: u64) {
        self.signaled.lock().push((fence, request_id));
    }

    fn fence_error_signaled(&self, _pipeline_index: u32, fence: FenceHandle, request_id: u64, flushing: bool) {
        self.failed.lock().push((fence, request_id, flushing));
        self.in_error.lock().insert(request_id);
    }

    fn add_deferred_node(&self, _pipeline_index: u32, request_id: u64, node: NodeId) {
        self.deferred.lock().push((request_id, node));
    }

    fn dispatch_ready_nodes(&self) {
        self.dispatches.fetch_add(1, Ordering::AcqRel);
    }

    fn notify_request_error(&self, _pipeline_index: u32, request_id: u64, node: NodeId) {
        self.request_errors.lock().push((request_id, node));
    }
}

/// A call a [`MockHardwareLink`] received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareCall {
    /// `link`
    Link,
    /// `unlink`
    Unlink,
    /// `stream_on`
    StreamOn,
    /// `stream_off` with the mode bits
    StreamOff(u32),
    /// `open_request`
    OpenRequest(u64),
}

/// Hardware link with switchable failures.
#[derive(Debug, Default)]
pub struct MockHardwareLink {
    calls: Mutex<Vec<HardwareCall>>,
    fail_link: AtomicBool,
    fail_stream_on: AtomicBool,
    fail_stream_off: AtomicBool,
}

impl MockHardwareLink {
    /// Calls received so far.
    pub fn calls(&self) -> Vec<HardwareCall> {
        self.calls.lock().clone()
    }

    /// Make `link` fail.
    pub fn fail_link(&self, fail: bool) {
        self.fail_link.store(fail, Ordering::Release);
    }

    /// Make `stream_on` fail.
    pub fn fail_stream_on(&self, fail: bool) {
        self.fail_stream_on.store(fail, Ordering::Release);
    }

    /// Make `stream_off` fail.
    pub fn fail_stream_off(&self, fail: bool) {
        self.fail_stream_off.store(fail, Ordering::Release);
    }

    fn outcome(&self, call: HardwareCall, fail: &AtomicBool) -> CodeResult {
        self.calls.lock().push(call);
        if fail.load(Ordering::Acquire) {
            Err(ResultCode::Failed)
        } else {
            Ok(())
        }
    }
}

impl HardwareLink for MockHardwareLink {
    fn link(&self) -> CodeResult {
        self.outcome(HardwareCall::Link, &self.fail_link)
    }

    fn unlink(&self) -> CodeResult {
        self.calls.lock().push(HardwareCall::Unlink);
        Ok(())
    }

    fn stream_on(&self) -> CodeResult {
        self.outcome(HardwareCall::StreamOn, &self.fail_stream_on)
    }

    fn stream_off(&self, mode: DeactivateMode) -> CodeResult {
        self.outcome(HardwareCall::StreamOff(mode.bits()), &self.fail_stream_off)
    }

    fn open_request(&self, request_id: u64, _sync_id: u64, _mode: SyncMode, _exposure_timeout_ms: u32) -> CodeResult {
        self.calls.lock().push(HardwareCall::OpenRequest(request_id));
        Ok(())
    }
}

/// Metadata pool that records flush windows.
#[derive(Debug, Default)]
pub struct MockMetadataPool {
    flushes: Mutex<Vec<(u64, u64)>>,
    depth: AtomicUsize,
}

impl MockMetadataPool {
    /// Flush windows received.
    pub fn flushes(&self) -> Vec<(u64, u64)> {
        self.flushes.lock().clone()
    }

    /// Depth set at finalize.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

impl MetadataPool for MockMetadataPool {
    fn flush(&self, after: u64, up_to: u64) {
        self.flushes.lock().push((after, up_to));
    }

    fn set_depth(&self, slots: usize) {
        self.depth.store(slots, Ordering::Release);
    }
}

/// Tuning data that is always loaded.
#[derive(Debug, Default)]
pub struct MockTuningData;

impl TuningData for MockTuningData {
    fn is_loaded(&self) -> bool {
        true
    }
}

/// Chain `nodes` in order, with a sink on stream 0 at the last node.
pub fn chain_graph(nodes: &[Arc<MockNode>]) -> NodeGraph {
    let mut graph = NodeGraph::new();
    for node in nodes {
        graph = graph.with_node(node.clone());
    }
    for pair in nodes.windows(2) {
        if let [src, dst] = pair {
            graph = graph.with_link(src.node_id(), 0, dst.node_id(), 0);
        }
    }
    if let Some(last) = nodes.last() {
        graph = graph.with_sink(last.node_id(), 0, 0, BufferRequirement::exact(1920, 1080, Format::Ubwc));
    }
    graph
}

/// A pipeline wired to mock collaborators.
#[derive(Debug)]
pub struct Harness {
    /// The pipeline under test
    pub pipeline: Pipeline,
    /// Session mock
    pub session: Arc<RecordingSession>,
    /// Dependency queue mock
    pub queue: Arc<MockDependencyQueue>,
    /// Hardware mock, ignored by offline pipelines
    pub hardware: Arc<MockHardwareLink>,
    /// Main metadata pool mock
    pub pool: Arc<MockMetadataPool>,
    /// Nodes in registration order
    pub nodes: Vec<Arc<MockNode>>,
}

impl Harness {
    /// Create and finalize a pipeline over `graph`.
    ///
    /// # Errors
    ///
    /// Returns creation or finalize failures.
    pub fn build(config: PipelineConfig, graph: NodeGraph, nodes: Vec<Arc<MockNode>>) -> campipe_errors::Result<Self> {
        let session = Arc::new(RecordingSession::default());
        let queue = Arc::new(MockDependencyQueue::default());
        let hardware = Arc::new(MockHardwareLink::default());
        let pool = Arc::new(MockMetadataPool::default());

        let collaborators = Collaborators::new(session.clone(), queue.clone())
            .with_hardware(hardware.clone())
            .with_pool(campipe_pipeline::metadata::PoolKind::Main, pool.clone())
            .with_tuning(Arc::new(MockTuningData));
        let pipeline = Pipeline::create(config, graph, collaborators)?;
        pipeline.finalize()?;

        Ok(Self {
            pipeline,
            session,
            queue,
            hardware,
            pool,
            nodes,
        })
    }

    /// Finalized pipeline over a chain of `nodes`.
    ///
    /// # Errors
    ///
    /// Returns creation or finalize failures.
    pub fn chain(config: PipelineConfig, nodes: Vec<MockNode>) -> campipe_errors::Result<Self> {
        let nodes: Vec<Arc<MockNode>> = nodes.into_iter().map(Arc::new).collect();
        let graph = chain_graph(&nodes);
        Self::build(config, graph, nodes)
    }

    /// Report `axis` done for `request_id` from every node.
    ///
    /// # Errors
    ///
    /// Returns the first completion failure.
    pub fn complete_all(&self, request_id: u64, axis: campipe_pipeline::CompletionAxis) -> campipe_errors::Result<()> {
        for node in &self.nodes {
            self.pipeline.notify_node_completion(node.node_id(), request_id, axis)?;
        }
        Ok(())
    }
}
