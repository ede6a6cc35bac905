//! Construction-time errors.
//!
//! Raised while the node graph is registered, validated and negotiated.
//! These are never retried internally: they indicate a graph description
//! that cannot be streamed.

use crate::code::ResultCode;
use crate::common::ErrorSeverity;

/// Errors raised while creating or finalizing a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConstructionError {
    /// The graph has no nodes
    #[error("Pipeline graph has no nodes")]
    EmptyGraph,

    /// Two nodes were registered under the same id
    #[error("Duplicate node {node}")]
    DuplicateNode {
        /// Node identifier
        node: String,
    },

    /// A link references a node that was never registered
    #[error("Link references unknown node {node}")]
    UnknownNode {
        /// Node identifier
        node: String,
    },

    /// An input port has more than one upstream link
    #[error("Input port {port} of node {node} is driven by more than one link")]
    InputDrivenTwice {
        /// Node identifier
        node: String,
        /// Input port id
        port: u32,
    },

    /// No output port in the graph is a sink
    #[error("Pipeline graph has no sink port")]
    NoSinkPort,

    /// A sink port was declared without a stream id
    #[error("Sink port {port} of node {node} has no stream id")]
    SinkWithoutStream {
        /// Node identifier
        node: String,
        /// Output port id
        port: u32,
    },

    /// The graph contains a cycle
    #[error("Pipeline graph contains a cycle through node {node}")]
    CyclicGraph {
        /// A node on the cycle
        node: String,
    },

    /// The walk-forward order list would exceed the node count
    #[error("Negotiation order list overflow at node {node}: capacity {capacity}")]
    OrderListOverflow {
        /// Node that could not be recorded
        node: String,
        /// Number of nodes in the graph
        capacity: usize,
    },

    /// The order list does not cover every node after negotiation
    #[error("Negotiation ordered {ordered} of {nodes} nodes")]
    OrderMismatch {
        /// Entries in the order list
        ordered: usize,
        /// Nodes in the graph
        nodes: usize,
    },

    /// A node cannot satisfy the requirements of its consumers
    #[error("Node {node} cannot satisfy buffer requirement on port {port}: {reason}")]
    UnsatisfiableRequirement {
        /// Node identifier
        node: String,
        /// Port id
        port: u32,
        /// Why the requirement cannot be met
        reason: String,
    },

    /// Finalize was called a second time
    #[error("Pipeline {pipeline} is already finalized")]
    AlreadyFinalized {
        /// Pipeline identity string
        pipeline: String,
    },

    /// A node reported failure during a construction step
    #[error("Node {node} failed during {operation}: {code}")]
    NodeFailed {
        /// Node identifier
        node: String,
        /// Construction step
        operation: &'static str,
        /// Reported result code
        code: ResultCode,
    },

    /// Out of memory
    #[error("Out of memory while {0}")]
    OutOfMemory(&'static str),
}

impl ConstructionError {
    /// Get the error severity.
    ///
    /// Every construction error prevents streaming, so all are at least
    /// [`ErrorSeverity::Error`].
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ConstructionError::OrderListOverflow { .. }
            | ConstructionError::OrderMismatch { .. }
            | ConstructionError::OutOfMemory(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get the summary result code.
    pub fn code(&self) -> ResultCode {
        match self {
            ConstructionError::OutOfMemory(_) => ResultCode::OutOfMemory,
            ConstructionError::AlreadyFinalized { .. } => ResultCode::InvalidState,
            ConstructionError::NodeFailed { code, .. } => *code,
            ConstructionError::UnsatisfiableRequirement { .. } => ResultCode::Unsupported,
            _ => ResultCode::InvalidArgument,
        }
    }

    /// Create a duplicate node error.
    pub fn duplicate_node(node: impl Into<String>) -> Self {
        ConstructionError::DuplicateNode { node: node.into() }
    }

    /// Create an unknown node error.
    pub fn unknown_node(node: impl Into<String>) -> Self {
        ConstructionError::UnknownNode { node: node.into() }
    }

    /// Create a node failure error.
    pub fn node_failed(node: impl Into<String>, operation: &'static str, code: ResultCode) -> Self {
        ConstructionError::NodeFailed {
            node: node.into(),
            operation,
            code,
        }
    }
}
