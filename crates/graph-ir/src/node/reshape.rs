//! # Reshape
//!
//! Reshapes the input tensor to the shape stored in the configuration.
//!
//! ## Special Features
//! - `-1`: at most one dimension, inferred from the element count and the
//!   remaining dimensions
//! - `0`: copies the corresponding dimension of the input
//!
//! The target shape is an operator parameter rather than a second input, so a
//! Reshape inserted by a rewrite carries everything it needs.

use derive_new::new;

use crate::error::GraphError;
use crate::ir::{Graph, NodeId, Operation};

use super::{input_shape, unexpected_operation};

/// Configuration for the Reshape operation.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct ReshapeConfig {
    pub dim: Vec<i64>,
}

impl ReshapeConfig {
    /// Reshape to a fully known shape.
    pub fn to_shape(shape: &[usize]) -> Self {
        Self::new(shape.iter().map(|&d| d as i64).collect())
    }
}

pub(crate) fn infer(graph: &Graph, op: NodeId) -> Result<Vec<Vec<usize>>, GraphError> {
    let Operation::Reshape(config) = &graph.op(op)?.operation else {
        return Err(unexpected_operation(op, "Reshape"));
    };
    let input = input_shape(graph, op, 0)?;
    Ok(vec![resolve_shape(op, &input, &config.dim)?])
}

fn resolve_shape(op: NodeId, input: &[usize], dim: &[i64]) -> Result<Vec<usize>, GraphError> {
    let invalid = |reason: String| GraphError::InvalidAttribute {
        node: op,
        name: "dim".to_string(),
        reason,
    };

    let mut inferred = None;
    let mut shape = Vec::with_capacity(dim.len());
    for (i, &d) in dim.iter().enumerate() {
        match d {
            -1 => {
                if inferred.replace(i).is_some() {
                    return Err(invalid("more than one -1 dimension".to_string()));
                }
                shape.push(1);
            }
            0 => {
                let copied = input
                    .get(i)
                    .ok_or_else(|| invalid(format!("dimension {i} copies a missing input axis")))?;
                shape.push(*copied);
            }
            d if d > 0 => shape.push(d as usize),
            d => return Err(invalid(format!("negative dimension {d}"))),
        }
    }

    let total: usize = input.iter().product();
    let known: usize = shape.iter().product();
    match inferred {
        Some(i) => {
            if known == 0 || total % known != 0 {
                return Err(invalid(format!(
                    "cannot infer -1 dimension from {total} elements"
                )));
            }
            shape[i] = total / known;
        }
        None if known != total => {
            return Err(GraphError::SizeMismatch {
                actual: known,
                expected: total,
            });
        }
        None => {}
    }
    Ok(shape)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolve(input: &[usize], dim: &[i64]) -> Result<Vec<usize>, GraphError> {
        resolve_shape(NodeId(0), input, dim)
    }

    #[test]
    fn test_reshape_static() {
        assert_eq!(resolve(&[2, 3, 4], &[2, 3, 4, 1]).unwrap(), vec![2, 3, 4, 1]);
    }

    #[test]
    fn test_reshape_infer_minus_one_and_zero() {
        assert_eq!(resolve(&[2, 3, 4], &[0, -1]).unwrap(), vec![2, 12]);
        assert_eq!(resolve(&[2, 3, 4], &[-1]).unwrap(), vec![24]);
    }

    #[test]
    fn test_reshape_two_minus_one_rejected() {
        assert!(matches!(
            resolve(&[2, 3], &[-1, -1]),
            Err(GraphError::InvalidAttribute { .. })
        ));
    }

    #[test]
    fn test_reshape_size_mismatch() {
        assert_eq!(
            resolve(&[2, 3], &[4, 2]),
            Err(GraphError::SizeMismatch {
                actual: 8,
                expected: 6
            })
        );
    }

    #[test]
    fn test_to_shape() {
        assert_eq!(ReshapeConfig::to_shape(&[1, 3, 1]).dim, vec![1, 3, 1]);
    }
}
