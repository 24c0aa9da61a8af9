//! Error type shared by the graph model, the matcher and the rewrite rules.
//!
//! A rule that does not apply to a match is not an error: it returns `Ok(false)`.
//! Everything in [`GraphError`] is either a broken invariant or a configuration
//! mistake, and the pass manager stops at the first one.

use thiserror::Error;

use crate::ir::{NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// A node id that is not (or no longer) part of the graph.
    #[error("node {0} does not exist")]
    MissingNode(NodeId),

    /// An operation that needs an operator got a data node, or vice versa.
    #[error("node {node} is a {actual} node, expected a {expected} node")]
    KindMismatch {
        node: NodeId,
        expected: NodeKind,
        actual: NodeKind,
    },

    /// The mutation would break the alternating op/data normal form or the
    /// single-producer rule for data nodes.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    /// The edge `from -> to` would close a cycle.
    #[error("edge {from} -> {to} would create a cycle")]
    Cycle { from: NodeId, to: NodeId },

    /// The data node would keep consumers while losing its producer.
    #[error("data node {0} would be left with consumers but no producer")]
    DanglingData(NodeId),

    #[error("input port {port} of node {node} is already connected")]
    PortInUse { node: NodeId, port: usize },

    #[error("input port {port} of node {node} is not connected")]
    PortNotConnected { node: NodeId, port: usize },

    #[error("malformed pattern: {0}")]
    MalformedPattern(String),

    /// A rule asked a match for a role the pattern does not declare.
    #[error("role '{0}' is not bound in the match")]
    UnboundRole(String),

    #[error("node {node} is missing attribute '{name}'")]
    MissingAttribute { node: NodeId, name: String },

    #[error("invalid attribute '{name}' on node {node}: {reason}")]
    InvalidAttribute {
        node: NodeId,
        name: String,
        reason: String,
    },

    /// `run_after`/`run_before` declarations form a cycle.
    #[error("rule ordering contains a cycle among: {0:?}")]
    RuleCycle(Vec<String>),

    #[error("rule '{0}' is registered twice")]
    DuplicateRule(String),

    #[error("actual data size {actual} is not equal expected data size {expected}")]
    SizeMismatch { actual: usize, expected: usize },

    #[error("shape inference failed for node {node}: {reason}")]
    ShapeInference { node: NodeId, reason: String },

    #[error("tensor data error: {0}")]
    TensorData(String),
}
