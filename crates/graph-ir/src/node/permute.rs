//! # Permute
//!
//! Reorders the axes of the input: output axis `i` is input axis `order[i]`.

use derive_new::new;

use crate::error::GraphError;
use crate::ir::{Graph, NodeId, Operation};
use crate::permutation::Permutation;

use super::{input_shape, unexpected_operation};

/// Configuration for the Permute operation.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct PermuteConfig {
    pub order: Vec<usize>,
}

impl PermuteConfig {
    /// Validated view of the order, failing when it is not a permutation.
    pub fn permutation(&self, node: NodeId) -> Result<Permutation, GraphError> {
        Permutation::new(self.order.clone()).ok_or_else(|| GraphError::InvalidAttribute {
            node,
            name: "order".to_string(),
            reason: format!("{:?} is not a permutation", self.order),
        })
    }
}

pub(crate) fn infer(graph: &Graph, op: NodeId) -> Result<Vec<Vec<usize>>, GraphError> {
    let Operation::Permute(config) = &graph.op(op)?.operation else {
        return Err(unexpected_operation(op, "Permute"));
    };
    let input = input_shape(graph, op, 0)?;
    let shape = config
        .permutation(op)?
        .apply(&input)
        .ok_or_else(|| GraphError::ShapeInference {
            node: op,
            reason: format!(
                "order of length {} applied to rank {}",
                config.order.len(),
                input.len()
            ),
        })?;
    Ok(vec![shape])
}
