use burn_tensor::{DType, TensorData};

use crate::error::GraphError;
use crate::ir::{DataNode, Graph, InPort, Layout, NodeId, OpType, Operation, TensorDataExt};
use crate::node::StridedSliceConfig;
use crate::pattern::{Match, NodePredicate, Pattern};
use crate::permutation::{Permutation, permute_array_with_ellipsis};

use super::RewriteRule;

/// Convert StridedSlice masks and constant bounds from NHWC to NCHW.
///
/// Only runs on graphs imported in NHWC layout, and only on slices touching a
/// tensor of rank 4 or more. The permutation covers the output rank plus the
/// shrunk axes. A slice is converted once; the config records it.
pub struct StridedSliceLayout;

impl RewriteRule for StridedSliceLayout {
    fn name(&self) -> &'static str {
        "StridedSliceLayout"
    }

    fn run_before(&self) -> Vec<&'static str> {
        vec!["DeadNodeElimination"]
    }

    fn pattern(&self) -> Result<Option<Pattern>, GraphError> {
        Pattern::builder()
            .node("slice", NodePredicate::op(OpType::StridedSlice))
            .build()
            .map(Some)
    }

    fn replace_pattern(&self, graph: &mut Graph, m: &Match) -> Result<bool, GraphError> {
        if graph.layout != Layout::Nhwc {
            return Ok(false);
        }
        let slice = m.get("slice")?;
        let Operation::StridedSlice(config) = &graph.op(slice)?.operation else {
            return Ok(false);
        };
        if config.permuted {
            return Ok(false);
        }
        let config = config.clone();

        let in_rank = rank(graph, graph.in_data(slice.in_port(0)))?;
        let Some(out_rank) = rank(graph, graph.out_data(slice.out_port(0)))? else {
            log::debug!("{}: output rank of {} is unknown", self.name(), slice);
            return Ok(false);
        };
        if in_rank.unwrap_or(0) < 4 && out_rank < 4 {
            return Ok(false);
        }

        let perm = Permutation::nhwc_to_nchw(config.addressed_rank(out_rank));
        let ellipsis = config.ellipsis_position();

        let mut bounds = Vec::new();
        for (port, fill) in [
            (StridedSliceConfig::BEGIN, 0),
            (StridedSliceConfig::END, 0),
            (StridedSliceConfig::STRIDE, 1),
        ] {
            let Some(data) = graph.in_data(slice.in_port(port)) else {
                continue;
            };
            let Some(value) = &graph.data(data)?.value else {
                log::debug!("{}: input {} of {} is not constant", self.name(), port, slice);
                return Ok(false);
            };
            let dtype = value.dtype;
            if !matches!(dtype, DType::I64 | DType::I32) {
                log::debug!("{}: input {} of {} is {:?}", self.name(), port, slice, dtype);
                return Ok(false);
            }
            let permuted = permute_array_with_ellipsis(&value.to_i64_vec()?, &perm, ellipsis, fill);
            bounds.push((port, data, int_tensor(permuted, dtype)));
        }

        graph.op_mut(slice)?.operation = Operation::StridedSlice(config.permute_masks(&perm));
        for (port, data, value) in bounds {
            if graph.consumers(data).len() == 1 {
                let node = graph.data_mut(data)?;
                node.shape = Some(value.shape_vec());
                node.value = Some(value);
            } else {
                // Other readers keep the NHWC values
                replace_shared_bound(graph, slice.in_port(port), data, value)?;
            }
        }
        Ok(true)
    }
}

/// Feed `port` from a fresh constant holding `value` instead of the shared `data`.
fn replace_shared_bound(
    graph: &mut Graph,
    port: InPort,
    data: NodeId,
    value: TensorData,
) -> Result<(), GraphError> {
    let name = graph.node(data)?.name.clone();
    let constant = graph.add_op(graph.unique_name(&format!("{name}/nchw")), Operation::Const);
    let copy = graph.add_data(
        graph.unique_name(&format!("{name}/nchw_data")),
        DataNode::constant(value),
    );
    graph.connect_output(constant.out_port(0), copy)?;
    graph.disconnect(port)?;
    graph.connect_data(copy, port)?;
    log::debug!("StridedSliceLayout: {} now reads private copy {} of {}", port.node, copy, data);
    Ok(())
}

fn rank(graph: &Graph, data: Option<NodeId>) -> Result<Option<usize>, GraphError> {
    match data {
        Some(data) => Ok(graph.data(data)?.resolved_shape().map(|shape| shape.len())),
        None => Ok(None),
    }
}

fn int_tensor(values: Vec<i64>, dtype: DType) -> TensorData {
    let shape = vec![values.len()];
    match dtype {
        DType::I32 => TensorData::new(
            values.into_iter().map(|v| v as i32).collect::<Vec<i32>>(),
            shape,
        ),
        _ => TensorData::new(values, shape),
    }
}
