//! Node graph description.
//!
//! The graph is assembled before the pipeline is created and never changes
//! afterwards. Nodes are stored in registration order and addressed by that
//! index internally; links and sink ports refer to nodes by [`NodeId`].

use std::sync::Arc;

use crate::negotiation::BufferRequirement;
use crate::node::Node;
use crate::types::{NodeId, PortId, StreamId};

/// Directed link from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    /// Producing node
    pub src: NodeId,
    /// Output port on the producing node
    pub src_port: PortId,
    /// Consuming node
    pub dst: NodeId,
    /// Input port on the consuming node
    pub dst_port: PortId,
}

/// Output port that leaves the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkPort {
    /// Node owning the port
    pub node: NodeId,
    /// Output port id
    pub port: PortId,
    /// Stream the port delivers to; required
    pub stream_id: Option<StreamId>,
    /// Buffer requirement of the stream
    pub requirement: BufferRequirement,
}

/// Immutable set of nodes, links and sink ports.
#[derive(Debug, Default, Clone)]
pub struct NodeGraph {
    pub(crate) nodes: Vec<Arc<dyn Node>>,
    pub(crate) links: Vec<Link>,
    pub(crate) sinks: Vec<SinkPort>,
}

impl NodeGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node.
    #[must_use]
    pub fn with_node(mut self, node: Arc<dyn Node>) -> Self {
        self.nodes.push(node);
        self
    }

    /// Link `src:src_port` to `dst:dst_port`.
    #[must_use]
    pub fn with_link(mut self, src: NodeId, src_port: PortId, dst: NodeId, dst_port: PortId) -> Self {
        self.links.push(Link {
            src,
            src_port,
            dst,
            dst_port,
        });
        self
    }

    /// Declare `node:port` as a sink delivering `stream_id`.
    #[must_use]
    pub fn with_sink(
        mut self,
        node: NodeId,
        port: PortId,
        stream_id: StreamId,
        requirement: BufferRequirement,
    ) -> Self {
        self.sinks.push(SinkPort {
            node,
            port,
            stream_id: Some(stream_id),
            requirement,
        });
        self
    }

    /// Declare a sink port without checking it carries a stream id.
    #[must_use]
    pub fn with_sink_port(mut self, sink: SinkPort) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in registration order.
    pub fn nodes(&self) -> &[Arc<dyn Node>] {
        &self.nodes
    }

    /// Links in registration order.
    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Sink ports in registration order.
    pub fn sinks(&self) -> &[SinkPort] {
        &self.sinks
    }

    /// Index of the node with `id`.
    #[must_use]
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.nodes.iter().position(|n| n.id() == id)
    }

    /// Node at `index`.
    #[must_use]
    pub fn node(&self, index: usize) -> Option<&Arc<dyn Node>> {
        self.nodes.get(index)
    }

    /// Indices of distinct nodes feeding `index`, in link order.
    #[must_use]
    pub fn parents(&self, index: usize) -> Vec<usize> {
        let Some(id) = self.node(index).map(|n| n.id()) else {
            return Vec::new();
        };
        let mut parents = Vec::new();
        for link in self.links.iter().filter(|l| l.dst == id) {
            if let Some(parent) = self.index_of(link.src)
                && !parents.contains(&parent)
            {
                parents.push(parent);
            }
        }
        parents
    }

    /// Indices of distinct nodes fed by `index`, in link order.
    #[must_use]
    pub fn children(&self, index: usize) -> Vec<usize> {
        let Some(id) = self.node(index).map(|n| n.id()) else {
            return Vec::new();
        };
        let mut children = Vec::new();
        for link in self.links.iter().filter(|l| l.src == id) {
            if let Some(child) = self.index_of(link.dst)
                && !children.contains(&child)
            {
                children.push(child);
            }
        }
        children
    }

    /// Sink ports owned by `index`.
    pub fn sinks_of(&self, index: usize) -> impl Iterator<Item = &SinkPort> {
        let id = self.node(index).map(|n| n.id());
        self.sinks.iter().filter(move |s| Some(s.node) == id)
    }

    /// Whether `id:port` is a sink port.
    #[must_use]
    pub fn is_sink_port(&self, id: NodeId, port: PortId) -> bool {
        self.sinks.iter().any(|s| s.node == id && s.port == port)
    }

    /// Stream id of the sink port `id:port`.
    #[must_use]
    pub fn sink_stream(&self, id: NodeId, port: PortId) -> Option<StreamId> {
        self.sinks
            .iter()
            .find(|s| s.node == id && s.port == port)
            .and_then(|s| s.stream_id)
    }

    /// Whether the node at `index` has no inbound link.
    #[must_use]
    pub fn is_source(&self, index: usize) -> bool {
        self.node(index)
            .map(|n| n.id())
            .is_some_and(|id| !self.links.iter().any(|l| l.dst == id))
    }
}
