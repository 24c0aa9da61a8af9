//! Node types
//!
//! A node is either an operator or a data node. Operators carry a typed
//! [`Operation`] (their parameters) and an optional shape inference capability;
//! data nodes carry the tensor metadata flowing between operators. Both share a
//! residual attribute map for metadata no rule depends on.

use core::fmt;
use std::collections::HashMap;

use burn_tensor::{DType, TensorData};

use crate::node::{
    InferFn, PermuteConfig, QuantizeConfig, ReshapeConfig, StridedSliceConfig, TileConfig,
    default_infer,
};

use super::port::{InPort, OutPort};

/// Stable handle of a node inside a [`Graph`](super::Graph).
///
/// Ids are never reused after a node is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }

    pub fn in_port(self, idx: usize) -> InPort {
        InPort::new(self, idx)
    }

    pub fn out_port(self, idx: usize) -> OutPort {
        OutPort::new(self, idx)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Op,
    Data,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Op => f.write_str("op"),
            NodeKind::Data => f.write_str("data"),
        }
    }
}

/// Operator discriminant, used by pattern predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Parameter,
    Const,
    Output,
    Mul,
    Quantize,
    Permute,
    Tile,
    Reshape,
    StridedSlice,
    Custom,
}

/// An operator together with its parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Graph input; its output data node carries the shape.
    Parameter,
    /// Produces a constant data node.
    Const,
    /// Graph output sink.
    Output,
    Mul,
    Quantize(QuantizeConfig),
    Permute(PermuteConfig),
    Tile(TileConfig),
    Reshape(ReshapeConfig),
    StridedSlice(StridedSliceConfig),
    /// Any operator the rules do not know about.
    Custom(String),
}

impl Operation {
    pub fn op_type(&self) -> OpType {
        match self {
            Operation::Parameter => OpType::Parameter,
            Operation::Const => OpType::Const,
            Operation::Output => OpType::Output,
            Operation::Mul => OpType::Mul,
            Operation::Quantize(_) => OpType::Quantize,
            Operation::Permute(_) => OpType::Permute,
            Operation::Tile(_) => OpType::Tile,
            Operation::Reshape(_) => OpType::Reshape,
            Operation::StridedSlice(_) => OpType::StridedSlice,
            Operation::Custom(_) => OpType::Custom,
        }
    }
}

/// Residual attribute values.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Int64(i64),
    Int64s(Vec<i64>),
    Float32(f32),
    Float32s(Vec<f32>),
    String(String),
    Strings(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct OpNode {
    pub operation: Operation,

    /// Shape inference capability, called by the inference sweep and never by
    /// the rewrite rules themselves.
    pub infer: Option<InferFn>,
}

impl OpNode {
    /// Create an operator with the default inference capability for its type.
    pub fn new(operation: Operation) -> Self {
        let infer = default_infer(&operation);
        Self { operation, infer }
    }

    pub fn op_type(&self) -> OpType {
        self.operation.op_type()
    }
}

/// A tensor value flowing between operators.
#[derive(Debug, Clone, Default)]
pub struct DataNode {
    /// `None` until shape inference (or the importer) resolves it.
    pub shape: Option<Vec<usize>>,

    /// Present only for compile-time constants.
    pub value: Option<TensorData>,

    pub data_type: Option<DType>,
}

impl DataNode {
    pub fn with_shape(shape: Vec<usize>) -> Self {
        Self {
            shape: Some(shape),
            ..Default::default()
        }
    }

    /// Constant data node; shape and data type are taken from the value.
    pub fn constant(value: TensorData) -> Self {
        let shape = value.shape.iter().copied().collect();
        Self {
            shape: Some(shape),
            data_type: Some(value.dtype),
            value: Some(value),
        }
    }

    pub fn is_constant(&self) -> bool {
        self.value.is_some()
    }

    /// Shape of the node, falling back to the shape of its constant value.
    pub fn resolved_shape(&self) -> Option<Vec<usize>> {
        self.shape.clone().or_else(|| {
            self.value
                .as_ref()
                .map(|value| value.shape.iter().copied().collect())
        })
    }
}

#[derive(Debug, Clone)]
pub enum NodePayload {
    Op(OpNode),
    Data(DataNode),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub payload: NodePayload,
    pub attrs: HashMap<String, AttributeValue>,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self.payload {
            NodePayload::Op(_) => NodeKind::Op,
            NodePayload::Data(_) => NodeKind::Data,
        }
    }

    pub fn is_op(&self) -> bool {
        matches!(self.payload, NodePayload::Op(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self.payload, NodePayload::Data(_))
    }

    pub fn as_op(&self) -> Option<&OpNode> {
        match &self.payload {
            NodePayload::Op(op) => Some(op),
            NodePayload::Data(_) => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataNode> {
        match &self.payload {
            NodePayload::Data(data) => Some(data),
            NodePayload::Op(_) => None,
        }
    }

    /// Operator type, `None` for data nodes.
    pub fn op_type(&self) -> Option<OpType> {
        self.as_op().map(OpNode::op_type)
    }
}
