//! Graph validation
//!
//! Checks a [`NodeGraph`] before negotiation so that registration mistakes
//! surface as construction errors instead of corrupting negotiation.

use campipe_errors::{ConstructionError, Result};
use std::collections::HashSet;

use crate::graph::NodeGraph;
use crate::types::{NodeId, PortId};

/// Validator for node graphs.
#[derive(Debug, Clone, Default)]
pub struct GraphValidator;

impl GraphValidator {
    /// Create a new graph validator
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Validate a graph
    ///
    /// # Errors
    ///
    /// Returns [`ConstructionError`] if:
    /// - the graph has no nodes
    /// - two nodes share an id
    /// - a link or sink references an unknown node
    /// - an input port is driven by more than one link
    /// - no sink port exists, or a sink port has no stream id
    /// - the graph contains a cycle
    pub fn validate(&self, graph: &NodeGraph) -> Result<()> {
        if graph.is_empty() {
            return Err(ConstructionError::EmptyGraph.into());
        }

        self.validate_unique_ids(graph)?;
        self.validate_links(graph)?;
        self.validate_sinks(graph)?;
        self.validate_acyclic(graph)?;

        Ok(())
    }

    fn validate_unique_ids(&self, graph: &NodeGraph) -> Result<()> {
        let mut seen = HashSet::new();
        for node in graph.nodes() {
            if !seen.insert(node.id()) {
                return Err(ConstructionError::duplicate_node(node.name()).into());
            }
        }
        Ok(())
    }

    fn validate_links(&self, graph: &NodeGraph) -> Result<()> {
        let mut driven: HashSet<(NodeId, PortId)> = HashSet::new();
        for link in graph.links() {
            for id in [link.src, link.dst] {
                if graph.index_of(id).is_none() {
                    return Err(ConstructionError::unknown_node(id.to_string()).into());
                }
            }
            if !driven.insert((link.dst, link.dst_port)) {
                return Err(ConstructionError::InputDrivenTwice {
                    node: link.dst.to_string(),
                    port: link.dst_port,
                }
                .into());
            }
        }
        Ok(())
    }

    fn validate_sinks(&self, graph: &NodeGraph) -> Result<()> {
        if graph.sinks().is_empty() {
            return Err(ConstructionError::NoSinkPort.into());
        }
        for sink in graph.sinks() {
            if graph.index_of(sink.node).is_none() {
                return Err(ConstructionError::unknown_node(sink.node.to_string()).into());
            }
            if sink.stream_id.is_none() {
                return Err(ConstructionError::SinkWithoutStream {
                    node: sink.node.to_string(),
                    port: sink.port,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Kahn's algorithm: every node must be removable once its parents are.
    fn validate_acyclic(&self, graph: &NodeGraph) -> Result<()> {
        let count = graph.node_count();
        let mut pending: Vec<usize> = (0..count).map(|i| graph.parents(i).len()).collect();
        let mut ready: Vec<usize> = (0..count)
            .filter(|&i| pending.get(i).is_some_and(|p| *p == 0))
            .collect();
        let mut removed = 0usize;

        while let Some(index) = ready.pop() {
            removed += 1;
            for child in graph.children(index) {
                if let Some(p) = pending.get_mut(child) {
                    *p = p.saturating_sub(1);
                    if *p == 0 {
                        ready.push(child);
                    }
                }
            }
        }

        if removed < count {
            let stuck = pending
                .iter()
                .position(|p| *p > 0)
                .and_then(|i| graph.node(i))
                .map_or_else(String::new, |n| n.name().to_string());
            return Err(ConstructionError::CyclicGraph { node: stuck }.into());
        }
        Ok(())
    }
}
