//! # Quantize
//!
//! Fake quantization with five inputs: the tensor, then `min_in`, `max_in`,
//! `min_out` and `max_out`. Values are clamped to the input range and mapped to
//! `levels` evenly spaced points of the output range. The output has the shape
//! of the first input.

use derive_new::new;

use crate::error::GraphError;
use crate::ir::{Graph, NodeId};

use super::input_shape;

/// Configuration for the Quantize operation.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct QuantizeConfig {
    pub levels: u32,
}

impl QuantizeConfig {
    /// Input ports of the thresholds.
    pub const MIN_IN: usize = 1;
    pub const MAX_IN: usize = 2;
    pub const MIN_OUT: usize = 3;
    pub const MAX_OUT: usize = 4;

    /// Binarization: every value becomes `min_out` or `max_out`.
    pub fn is_binary(&self) -> bool {
        self.levels == 2
    }
}

pub(crate) fn infer(graph: &Graph, op: NodeId) -> Result<Vec<Vec<usize>>, GraphError> {
    Ok(vec![input_shape(graph, op, 0)?])
}
