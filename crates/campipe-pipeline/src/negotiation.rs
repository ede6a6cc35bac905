//! Two-pass buffer negotiation.
//!
//! Pass 1 walks back from the sink nodes. A node takes part only once every
//! node it feeds has computed its input requirement; it then merges those
//! requirements with its own sink ports, derives its input requirement and
//! records itself in the order list. The list is built from an explicit work
//! stack, so it is a post-order over the reversed graph.
//!
//! Pass 2 replays the reversed list (source first) and lets each node pick
//! its output properties from what its parents chose.
//!
//! If pass 1 hits an unsatisfiable requirement, every node is reset, sink
//! formats fall back to [`Format::Nv12`] and negotiation runs once more.

use campipe_errors::{CodeResult, ConstructionError, Result, ResultCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::graph::NodeGraph;
use crate::types::Format;

/// Format sinks fall back to when the first negotiation fails.
pub const FALLBACK_FORMAT: Format = Format::Nv12;

/// Range of acceptable buffer dimensions plus the preferred point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferRequirement {
    /// Minimum width
    pub min_width: u32,
    /// Minimum height
    pub min_height: u32,
    /// Maximum width
    pub max_width: u32,
    /// Maximum height
    pub max_height: u32,
    /// Preferred width
    pub optimal_width: u32,
    /// Preferred height
    pub optimal_height: u32,
    /// Pixel format
    pub format: Format,
}

impl BufferRequirement {
    /// Requirement accepting any dimensions.
    #[must_use]
    pub const fn unconstrained() -> Self {
        Self {
            min_width: 0,
            min_height: 0,
            max_width: u32::MAX,
            max_height: u32::MAX,
            optimal_width: 0,
            optimal_height: 0,
            format: Format::Raw10,
        }
    }

    /// Requirement for exactly `width` x `height`.
    #[must_use]
    pub const fn exact(width: u32, height: u32, format: Format) -> Self {
        Self {
            min_width: width,
            min_height: height,
            max_width: width,
            max_height: height,
            optimal_width: width,
            optimal_height: height,
            format,
        }
    }

    /// Intersect with `other`: max of mins, min of maxes, max of optimals.
    ///
    /// The format of `self` wins.
    #[must_use]
    pub fn merge(&self, other: &BufferRequirement) -> Self {
        Self {
            min_width: self.min_width.max(other.min_width),
            min_height: self.min_height.max(other.min_height),
            max_width: self.max_width.min(other.max_width),
            max_height: self.max_height.min(other.max_height),
            optimal_width: self.optimal_width.max(other.optimal_width),
            optimal_height: self.optimal_height.max(other.optimal_height),
            format: self.format,
        }
    }

    /// Whether some dimensions satisfy the requirement.
    #[must_use]
    pub fn is_satisfiable(&self) -> bool {
        self.min_width <= self.max_width && self.min_height <= self.max_height
    }
}

impl Default for BufferRequirement {
    fn default() -> Self {
        Self::unconstrained()
    }
}

/// Final properties of a node's output buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BufferProperties {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: Format,
}

impl BufferProperties {
    /// Pick properties inside `requirement`, starting from `parent` when one
    /// exists and from the optimal point otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ResultCode::Unsupported`] if the requirement is empty.
    pub fn fit(requirement: &BufferRequirement, parent: Option<&BufferProperties>) -> CodeResult<Self> {
        if !requirement.is_satisfiable() {
            return Err(ResultCode::Unsupported);
        }
        let (width, height) = match parent {
            Some(p) => (p.width, p.height),
            None => (requirement.optimal_width, requirement.optimal_height),
        };
        Ok(Self {
            width: width.clamp(requirement.min_width, requirement.max_width),
            height: height.clamp(requirement.min_height, requirement.max_height),
            format: requirement.format,
        })
    }
}

/// Walk-forward order: node indices, sources first.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NegotiationOrder {
    order: Vec<usize>,
}

impl NegotiationOrder {
    /// Node indices in walk-forward order.
    pub fn as_slice(&self) -> &[usize] {
        &self.order
    }

    /// Number of ordered nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the order is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Iterate node indices in walk-forward order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = usize> + '_ {
        self.order.iter().copied()
    }

    /// Record `index`, rejecting duplicates and overflow past `capacity`.
    fn record(&mut self, index: usize, capacity: usize, name: &str) -> Result<bool> {
        if self.order.contains(&index) {
            debug!(node = name, "Node already in negotiation order");
            return Ok(false);
        }
        if self.order.len() >= capacity {
            tracing::error!(node = name, capacity, "Negotiation order list overflow");
            return Err(ConstructionError::OrderListOverflow {
                node: name.to_string(),
                capacity,
            }
            .into());
        }
        self.order.push(index);
        Ok(true)
    }
}

/// Result of a successful negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationOutcome {
    /// Walk-forward order
    pub order: NegotiationOrder,
    /// Merged output requirement per node index
    pub requirements: Vec<BufferRequirement>,
    /// Output properties per node index
    pub properties: Vec<BufferProperties>,
    /// Whether the fallback format was needed
    pub renegotiated: bool,
}

impl NegotiationOutcome {
    /// Output properties of node `index`.
    #[must_use]
    pub fn properties_of(&self, index: usize) -> Option<&BufferProperties> {
        self.properties.get(index)
    }
}

/// Negotiate buffer properties for `graph`, retrying once with the fallback
/// format.
///
/// # Errors
///
/// Returns a [`ConstructionError`] if the order list overflows, does not
/// cover every node, or if no node can satisfy its consumers even after
/// renegotiation.
pub fn negotiate(graph: &NodeGraph, pipeline: &str) -> Result<NegotiationOutcome> {
    let (order, requirements, renegotiated) = match walk_back(graph, None) {
        Ok((order, requirements)) => (order, requirements, false),
        Err(err) if is_renegotiable(&err) => {
            warn!(pipeline, error = %err, "Negotiation failed, renegotiating with fallback format");
            for node in graph.nodes() {
                node.reset_negotiation();
            }
            let (order, requirements) = walk_back(graph, Some(FALLBACK_FORMAT))?;
            (order, requirements, true)
        }
        Err(err) => return Err(err),
    };

    let order = finish_order(graph, order, pipeline)?;
    let properties = walk_forward(graph, &order, &requirements)?;

    debug!(pipeline, order = ?order.as_slice(), renegotiated, "Buffer negotiation complete");
    Ok(NegotiationOutcome {
        order,
        requirements,
        properties,
        renegotiated,
    })
}

/// Requirement failures are retried with the fallback format; broken
/// ordering is not.
fn is_renegotiable(err: &campipe_errors::PipelineError) -> bool {
    matches!(
        err,
        campipe_errors::PipelineError::Construction(
            ConstructionError::UnsatisfiableRequirement { .. } | ConstructionError::NodeFailed { .. }
        )
    )
}

/// Pass 1. Returns the sink-first order and the merged output requirement
/// of every node.
fn walk_back(
    graph: &NodeGraph,
    sink_format: Option<Format>,
) -> Result<(NegotiationOrder, Vec<BufferRequirement>)> {
    let count = graph.node_count();
    let mut merged: Vec<Option<BufferRequirement>> = vec![None; count];
    let mut input_requirements: Vec<Option<BufferRequirement>> = vec![None; count];
    let mut pending: Vec<usize> = (0..count).map(|i| graph.children(i).len()).collect();
    let mut order = NegotiationOrder::default();

    let mut stack: Vec<usize> = (0..count)
        .rev()
        .filter(|&i| graph.children(i).is_empty() && graph.sinks_of(i).next().is_some())
        .collect();

    while let Some(index) = stack.pop() {
        let Some(node) = graph.node(index) else {
            continue;
        };

        let mut requirement: Option<BufferRequirement> = None;
        for sink in graph.sinks_of(index) {
            let mut sink_req = sink.requirement;
            if let Some(format) = sink_format {
                sink_req.format = format;
            }
            requirement = Some(requirement.map_or(sink_req, |r| r.merge(&sink_req)));
        }
        for child in graph.children(index) {
            if let Some(child_req) = input_requirements.get(child).copied().flatten() {
                requirement = Some(requirement.map_or(child_req, |r| r.merge(&child_req)));
            }
        }
        let requirement = requirement.unwrap_or_default();

        if !requirement.is_satisfiable() {
            return Err(ConstructionError::UnsatisfiableRequirement {
                node: node.name().to_string(),
                port: graph.sinks_of(index).next().map_or(0, |s| s.port),
                reason: format!(
                    "min {}x{} exceeds max {}x{}",
                    requirement.min_width,
                    requirement.min_height,
                    requirement.max_width,
                    requirement.max_height
                ),
            }
            .into());
        }

        let input = node.input_requirement(&requirement).map_err(|code| {
            ConstructionError::node_failed(node.name(), "input requirement", code)
        })?;

        if let Some(slot) = merged.get_mut(index) {
            *slot = Some(requirement);
        }
        if let Some(slot) = input_requirements.get_mut(index) {
            *slot = Some(input);
        }
        order.record(index, count, node.name())?;

        for parent in graph.parents(index).into_iter().rev() {
            if let Some(p) = pending.get_mut(parent) {
                *p = p.saturating_sub(1);
                if *p == 0 {
                    stack.push(parent);
                }
            }
        }
    }

    let requirements = merged.into_iter().map(Option::unwrap_or_default).collect();
    Ok((order, requirements))
}

/// Reverse the sink-first list and append nodes pass 1 never reached.
fn finish_order(graph: &NodeGraph, mut order: NegotiationOrder, pipeline: &str) -> Result<NegotiationOrder> {
    let count = graph.node_count();
    order.order.reverse();

    for index in 0..count {
        if !order.order.contains(&index) {
            let name = graph.node(index).map_or("", |n| n.name());
            warn!(pipeline, node = name, "Node not reached by negotiation, appending");
            order.record(index, count, name)?;
        }
    }

    if order.len() != count {
        return Err(ConstructionError::OrderMismatch {
            ordered: order.len(),
            nodes: count,
        }
        .into());
    }
    Ok(order)
}

/// Pass 2.
fn walk_forward(
    graph: &NodeGraph,
    order: &NegotiationOrder,
    requirements: &[BufferRequirement],
) -> Result<Vec<BufferProperties>> {
    let mut properties: Vec<Option<BufferProperties>> = vec![None; graph.node_count()];

    for index in order.iter() {
        let Some(node) = graph.node(index) else {
            continue;
        };
        let inputs: Vec<BufferProperties> = graph
            .parents(index)
            .into_iter()
            .filter_map(|p| properties.get(p).copied().flatten())
            .collect();
        let requirement = requirements.get(index).copied().unwrap_or_default();

        let chosen = node
            .determine_buffer_properties(&requirement, &inputs)
            .map_err(|code| ConstructionError::node_failed(node.name(), "determine buffer properties", code))?;

        if let Some(slot) = properties.get_mut(index) {
            *slot = Some(chosen);
        }
    }

    Ok(properties.into_iter().map(Option::unwrap_or_default).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{nid, stub};

    type TestResult = std::result::Result<(), Box<dyn std::error::Error>>;

    fn three_stage(sink: BufferRequirement) -> NodeGraph {
        NodeGraph::new()
            .with_node(stub(3, "jpeg"))
            .with_node(stub(1, "sensor"))
            .with_node(stub(2, "ife"))
            .with_link(nid(1), 0, nid(2), 0)
            .with_link(nid(2), 0, nid(3), 0)
            .with_sink(nid(3), 0, 0, sink)
    }

    #[test]
    fn test_order_is_source_first() -> TestResult {
        let graph = three_stage(BufferRequirement::exact(1920, 1080, Format::Jpeg));
        let outcome = negotiate(&graph, "test")?;
        assert_eq!(outcome.order.as_slice(), &[1, 2, 0]);
        assert!(!outcome.renegotiated);
        assert_eq!(
            outcome.properties_of(1),
            Some(&BufferProperties {
                width: 1920,
                height: 1080,
                format: Format::Jpeg
            })
        );
        Ok(())
    }

    #[test]
    fn test_merge_takes_tightest_bounds() {
        let a = BufferRequirement {
            min_width: 640,
            min_height: 480,
            max_width: 4000,
            max_height: 3000,
            optimal_width: 1280,
            optimal_height: 720,
            format: Format::Ubwc,
        };
        let b = BufferRequirement::exact(1920, 1080, Format::Nv12);
        let merged = a.merge(&b);
        assert_eq!(merged.min_width, 1920);
        assert_eq!(merged.max_width, 1920);
        assert_eq!(merged.optimal_height, 1080);
        assert_eq!(merged.format, Format::Ubwc);
    }

    #[test]
    fn test_fan_out_waits_for_all_children() -> TestResult {
        let graph = NodeGraph::new()
            .with_node(stub(1, "sensor"))
            .with_node(stub(2, "preview"))
            .with_node(stub(3, "video"))
            .with_link(nid(1), 0, nid(2), 0)
            .with_link(nid(1), 1, nid(3), 0)
            .with_sink(nid(2), 0, 0, BufferRequirement::exact(1280, 720, Format::Ubwc))
            .with_sink(nid(3), 0, 1, BufferRequirement::exact(1280, 720, Format::Nv12));
        let outcome = negotiate(&graph, "test")?;
        assert_eq!(outcome.order.as_slice().first(), Some(&0));
        assert_eq!(outcome.order.len(), 3);
        Ok(())
    }

    #[test]
    fn test_unreached_node_appended() -> TestResult {
        let graph = three_stage(BufferRequirement::unconstrained()).with_node(stub(9, "stats"));
        let outcome = negotiate(&graph, "test")?;
        assert_eq!(outcome.order.as_slice().last(), Some(&3));
        Ok(())
    }

    #[test]
    fn test_fit_rejects_empty_requirement() {
        let requirement = BufferRequirement {
            min_width: 10,
            max_width: 5,
            ..BufferRequirement::unconstrained()
        };
        assert_eq!(BufferProperties::fit(&requirement, None), Err(ResultCode::Unsupported));
    }
}
