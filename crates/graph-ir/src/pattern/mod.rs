//! Declarative subgraph patterns
//!
//! A [`Pattern`] is a list of named roles, each with a node predicate, plus the
//! edges required between roles. Patterns are plain data: they are built once
//! through [`PatternBuilder`], validated, and then evaluated by the generic
//! matcher in [`matcher`].
//!
//! ```
//! use graph_ir::ir::OpType;
//! use graph_ir::pattern::{NodePredicate, Pattern};
//!
//! let pattern = Pattern::builder()
//!     .node("first", NodePredicate::op(OpType::Permute))
//!     .node("mid", NodePredicate::data())
//!     .node("second", NodePredicate::op(OpType::Permute))
//!     .edge("first", "mid")
//!     .edge_port("mid", "second", 0)
//!     .build()
//!     .unwrap();
//! assert_eq!(pattern.roles().len(), 3);
//! ```

pub mod matcher;

pub use matcher::{find_first, find_matches};

use crate::error::GraphError;
use crate::ir::{AttributeValue, Node, NodeId, NodeKind, OpType};

/// A single check a node has to pass to fill a role.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrCheck {
    Kind(NodeKind),
    OpType(OpType),
    /// Data node with (or without) a constant value.
    HasValue(bool),
    /// Data node with a known shape of this rank.
    Rank(usize),
    /// Residual attribute equal to the given value.
    Attr(String, AttributeValue),
}

impl AttrCheck {
    pub fn holds(&self, node: &Node) -> bool {
        match self {
            AttrCheck::Kind(kind) => node.kind() == *kind,
            AttrCheck::OpType(op_type) => node.op_type() == Some(*op_type),
            AttrCheck::HasValue(expected) => node
                .as_data()
                .is_some_and(|data| data.is_constant() == *expected),
            AttrCheck::Rank(rank) => node
                .as_data()
                .and_then(|data| data.resolved_shape())
                .is_some_and(|shape| shape.len() == *rank),
            AttrCheck::Attr(name, value) => node.attrs.get(name) == Some(value),
        }
    }
}

/// Conjunction of [`AttrCheck`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePredicate {
    checks: Vec<AttrCheck>,
}

impl NodePredicate {
    /// Matches every node.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn op(op_type: OpType) -> Self {
        Self::any()
            .with(AttrCheck::Kind(NodeKind::Op))
            .with(AttrCheck::OpType(op_type))
    }

    pub fn data() -> Self {
        Self::any().with(AttrCheck::Kind(NodeKind::Data))
    }

    pub fn with(mut self, check: AttrCheck) -> Self {
        self.checks.push(check);
        self
    }

    pub fn matches(&self, node: &Node) -> bool {
        self.checks.iter().all(|check| check.holds(node))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub name: &'static str,
    pub predicate: NodePredicate,
}

/// Required edge between two roles, given by their index in the role list.
///
/// `port` constrains the operator side of the edge: the output port for an
/// `op -> data` edge, the input port for a `data -> op` edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternEdge {
    pub src: usize,
    pub dst: usize,
    pub port: Option<usize>,
}

/// Validated, immutable pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    roles: Vec<Role>,
    edges: Vec<PatternEdge>,
}

impl Pattern {
    pub fn builder() -> PatternBuilder {
        PatternBuilder::default()
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn edges(&self) -> &[PatternEdge] {
        &self.edges
    }

    pub fn role_index(&self, name: &str) -> Option<usize> {
        self.roles.iter().position(|role| role.name == name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatternBuilder {
    roles: Vec<Role>,
    edges: Vec<(&'static str, &'static str, Option<usize>)>,
}

impl PatternBuilder {
    /// Declare a role. Roles are bound in declaration order.
    pub fn node(mut self, name: &'static str, predicate: NodePredicate) -> Self {
        self.roles.push(Role { name, predicate });
        self
    }

    pub fn edge(mut self, src: &'static str, dst: &'static str) -> Self {
        self.edges.push((src, dst, None));
        self
    }

    /// Edge whose operator side is pinned to `port`.
    pub fn edge_port(mut self, src: &'static str, dst: &'static str, port: usize) -> Self {
        self.edges.push((src, dst, Some(port)));
        self
    }

    pub fn build(self) -> Result<Pattern, GraphError> {
        if self.roles.is_empty() {
            return Err(GraphError::MalformedPattern(
                "pattern declares no roles".to_string(),
            ));
        }

        for (i, role) in self.roles.iter().enumerate() {
            if self.roles[..i].iter().any(|other| other.name == role.name) {
                return Err(GraphError::MalformedPattern(format!(
                    "role '{}' is declared twice",
                    role.name
                )));
            }
        }

        let index = |name: &str| {
            self.roles
                .iter()
                .position(|role| role.name == name)
                .ok_or_else(|| {
                    GraphError::MalformedPattern(format!("edge refers to unknown role '{name}'"))
                })
        };

        let edges = self
            .edges
            .iter()
            .map(|&(src, dst, port)| {
                let edge = PatternEdge {
                    src: index(src)?,
                    dst: index(dst)?,
                    port,
                };
                if edge.src == edge.dst {
                    return Err(GraphError::MalformedPattern(format!(
                        "role '{src}' has an edge to itself"
                    )));
                }
                Ok(edge)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Pattern {
            roles: self.roles,
            edges,
        })
    }
}

/// Role bindings of one match, in role declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    bindings: Vec<(&'static str, NodeId)>,
}

impl Match {
    pub(crate) fn new(bindings: Vec<(&'static str, NodeId)>) -> Self {
        Self { bindings }
    }

    pub fn get(&self, role: &str) -> Result<NodeId, GraphError> {
        self.bindings
            .iter()
            .find(|(name, _)| *name == role)
            .map(|&(_, id)| id)
            .ok_or_else(|| GraphError::UnboundRole(role.to_string()))
    }

    /// Bound node ids in role order. Node ids are never reused, so this
    /// identifies the match for the lifetime of the graph.
    pub fn signature(&self) -> Vec<NodeId> {
        self.bindings.iter().map(|&(_, id)| id).collect()
    }

    pub fn bindings(&self) -> &[(&'static str, NodeId)] {
        &self.bindings
    }
}
