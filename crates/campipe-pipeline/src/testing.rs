//! Minimal collaborators used by unit tests.

use campipe_errors::Result;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::dependency::DependencyQueue;
use crate::fence::FenceHandle;
use crate::graph::NodeGraph;
use crate::negotiation::BufferRequirement;
use crate::node::Node;
use crate::pipeline::{Collaborators, Pipeline};
use crate::session::{ResultRecord, Session};
use crate::types::NodeId;

#[derive(Debug)]
pub(crate) struct StubNode {
    id: NodeId,
    name: String,
}

impl Node for StubNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

pub(crate) fn nid(type_id: u32) -> NodeId {
    NodeId::new(type_id, 0)
}

pub(crate) fn stub(type_id: u32, name: &str) -> Arc<dyn Node> {
    Arc::new(StubNode {
        id: nid(type_id),
        name: name.to_string(),
    })
}

#[derive(Debug, Default)]
pub(crate) struct RecordingSession {
    records: Mutex<Vec<ResultRecord>>,
    done: Mutex<Vec<u64>>,
}

impl RecordingSession {
    pub(crate) fn done_requests(&self) -> Vec<u64> {
        self.done.lock().clone()
    }

    pub(crate) fn count_kind(&self, kind: &str) -> usize {
        self.records.lock().iter().filter(|r| r.payload.kind() == kind).count()
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
        0
    }

    fn has_pending_results(&self) -> bool {
        false
    }

    fn live_pending_requests(&self) -> u32 {
        1
    }
}

#[derive(Debug, Default)]
pub(crate) struct StubQueue;

impl DependencyQueue for StubQueue {
    fn is_request_in_error(&self, _pipeline_index: u32, _request_id: u64) -> bool {
        false
    }

    fn fence_signaled(&self, _pipeline_index: u32, _fence: FenceHandle, _request_id: u64) {}

    fn fence_error_signaled(&self, _pipeline_index: u32, _fence: FenceHandle, _request_id: u64, _flushing: bool) {}

    fn add_deferred_node(&self, _pipeline_index: u32, _request_id: u64, _node: NodeId) {}

    fn dispatch_ready_nodes(&self) {}

    fn notify_request_error(&self, _pipeline_index: u32, _request_id: u64, _node: NodeId) {}
}

/// Finalized offline pipeline over a chain of `nodes` stub nodes.
pub(crate) fn offline_pipeline(nodes: u32) -> Result<(Pipeline, Arc<RecordingSession>)> {
    let mut graph = NodeGraph::new();
    for type_id in 1..=nodes {
        graph = graph.with_node(stub(type_id, &format!("node{type_id}")));
        if type_id > 1 {
            graph = graph.with_link(nid(type_id - 1), 0, nid(type_id), 0);
        }
    }
    graph = graph.with_sink(nid(nodes), 0, 0, BufferRequirement::default());

    let config = PipelineConfig::builder().name("Test").realtime(false).build()?;
    let session = Arc::new(RecordingSession::default());
    let pipeline = Pipeline::create(config, graph, Collaborators::new(session.clone(), Arc::new(StubQueue)))?;
    pipeline.finalize()?;
    Ok((pipeline, session))
}
