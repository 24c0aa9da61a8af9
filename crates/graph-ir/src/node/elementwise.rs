//! # Element-wise and structural operators
//!
//! Inference for the operators without a configuration:
//!
//! - **Parameter**: graph input; the shape is provided by the importer on its
//!   output data node and is passed through unchanged
//! - **Const**: the shape of the constant value it produces
//! - **Output**: sink without outputs
//! - **Mul**: numpy-style broadcast of both inputs

use crate::error::GraphError;
use crate::ir::{Graph, NodeId, broadcast_shapes};

use super::input_shape;

/// Shape already stored on the data node at output port 0.
fn own_output_shape(graph: &Graph, op: NodeId, what: &str) -> Result<Vec<usize>, GraphError> {
    let data = graph
        .out_data(op.out_port(0))
        .ok_or(GraphError::ShapeInference {
            node: op,
            reason: format!("{what} has no output data node"),
        })?;
    graph
        .data(data)?
        .resolved_shape()
        .ok_or_else(|| GraphError::ShapeInference {
            node: op,
            reason: format!("{what} output shape is unknown"),
        })
}

pub(crate) fn infer_parameter(graph: &Graph, op: NodeId) -> Result<Vec<Vec<usize>>, GraphError> {
    Ok(vec![own_output_shape(graph, op, "parameter")?])
}

pub(crate) fn infer_const(graph: &Graph, op: NodeId) -> Result<Vec<Vec<usize>>, GraphError> {
    Ok(vec![own_output_shape(graph, op, "constant")?])
}

pub(crate) fn infer_output(_graph: &Graph, _op: NodeId) -> Result<Vec<Vec<usize>>, GraphError> {
    Ok(Vec::new())
}

pub(crate) fn infer_mul(graph: &Graph, op: NodeId) -> Result<Vec<Vec<usize>>, GraphError> {
    let lhs = input_shape(graph, op, 0)?;
    let rhs = input_shape(graph, op, 1)?;
    let shape = broadcast_shapes(&lhs, &rhs).ok_or_else(|| GraphError::ShapeInference {
        node: op,
        reason: format!("shapes {lhs:?} and {rhs:?} do not broadcast"),
    })?;
    Ok(vec![shape])
}
