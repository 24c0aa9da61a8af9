//! # Tile
//!
//! Repeats the input `tiles` times along a single `axis`.
//!
//! Hardware plugins only accept rank-4 tiles; see
//! [`TileReshaper`](crate::rewrite::TileReshaper) for the legalization of rank-3 ones.

use derive_new::new;

use crate::error::GraphError;
use crate::ir::{Graph, NodeId, Operation};

use super::{input_shape, unexpected_operation};

/// Configuration for the Tile operation.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TileConfig {
    pub axis: usize,
    pub tiles: usize,
}

pub(crate) fn infer(graph: &Graph, op: NodeId) -> Result<Vec<Vec<usize>>, GraphError> {
    let Operation::Tile(config) = &graph.op(op)?.operation else {
        return Err(unexpected_operation(op, "Tile"));
    };

    let mut shape = input_shape(graph, op, 0)?;
    let Some(dim) = shape.get_mut(config.axis) else {
        return Err(GraphError::InvalidAttribute {
            node: op,
            name: "axis".to_string(),
            reason: format!("axis {} is out of range for rank {}", config.axis, shape.len()),
        });
    };
    *dim *= config.tiles;
    Ok(vec![shape])
}
