//! Operator configurations and shape inference
//!
//! Each operator module holds the typed configuration stored in
//! [`Operation`](crate::ir::Operation) and the inference function used by the
//! shape inference sweep. Rules never call inference directly; they only have
//! to leave every inserted operator with a correct configuration.

mod elementwise;
mod permute;
mod quantize;
mod reshape;
mod strided_slice;
mod tile;

pub use permute::PermuteConfig;
pub use quantize::QuantizeConfig;
pub use reshape::ReshapeConfig;
pub use strided_slice::StridedSliceConfig;
pub use tile::TileConfig;

use crate::error::GraphError;
use crate::ir::{Graph, NodeId, Operation};

/// Computes the output shapes of an operator, one entry per output port, from
/// the shapes of its inputs.
pub type InferFn = fn(&Graph, NodeId) -> Result<Vec<Vec<usize>>, GraphError>;

/// Inference capability an operator gets when it is created.
pub fn default_infer(operation: &Operation) -> Option<InferFn> {
    match operation {
        Operation::Parameter => Some(elementwise::infer_parameter),
        Operation::Const => Some(elementwise::infer_const),
        Operation::Output => Some(elementwise::infer_output),
        Operation::Mul => Some(elementwise::infer_mul),
        Operation::Quantize(_) => Some(quantize::infer),
        Operation::Permute(_) => Some(permute::infer),
        Operation::Tile(_) => Some(tile::infer),
        Operation::Reshape(_) => Some(reshape::infer),
        Operation::StridedSlice(_) | Operation::Custom(_) => None,
    }
}

/// Shape of the data node feeding input `idx` of `op`.
pub(crate) fn input_shape(graph: &Graph, op: NodeId, idx: usize) -> Result<Vec<usize>, GraphError> {
    let data = graph.input(op.in_port(idx))?;
    graph
        .data(data)?
        .resolved_shape()
        .ok_or_else(|| GraphError::ShapeInference {
            node: op,
            reason: format!("shape of input {idx} is unknown"),
        })
}

pub(crate) fn unexpected_operation(op: NodeId, expected: &str) -> GraphError {
    GraphError::InvalidAttribute {
        node: op,
        name: "operation".to_string(),
        reason: format!("expected a {expected} operator"),
    }
}
