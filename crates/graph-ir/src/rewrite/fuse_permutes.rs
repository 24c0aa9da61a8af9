use crate::error::GraphError;
use crate::ir::{Graph, NodeId, OpType, Operation};
use crate::node::PermuteConfig;
use crate::pattern::{Match, NodePredicate, Pattern};

use super::{RewriteRule, RuleMode};

/// Fuse two consecutive Permute operators.
///
/// The pair is replaced by a single Permute with the composed order
/// `order1[order2[i]]`, or removed entirely when the composition is the
/// identity. Only simple chains are fused: the intermediate data node must feed
/// the second Permute alone.
pub struct FusePermutesSequence;

impl RewriteRule for FusePermutesSequence {
    fn name(&self) -> &'static str {
        "FusePermutesSequence"
    }

    fn mode(&self) -> RuleMode {
        RuleMode::FixedPoint
    }

    fn pattern(&self) -> Result<Option<Pattern>, GraphError> {
        Pattern::builder()
            .node("first", NodePredicate::op(OpType::Permute))
            .node("mid", NodePredicate::data())
            .node("second", NodePredicate::op(OpType::Permute))
            .edge_port("first", "mid", 0)
            .edge_port("mid", "second", 0)
            .build()
            .map(Some)
    }

    fn replace_pattern(&self, graph: &mut Graph, m: &Match) -> Result<bool, GraphError> {
        let first = m.get("first")?;
        let mid = m.get("mid")?;
        let second = m.get("second")?;

        if graph.consumers(mid).len() != 1 {
            log::debug!("{}: {} has more than one consumer", self.name(), mid);
            return Ok(false);
        }

        let first_perm = order(graph, first)?.permutation(first)?;
        let second_perm = order(graph, second)?.permutation(second)?;
        let composed = first_perm
            .compose(&second_perm)
            .ok_or_else(|| GraphError::InvalidAttribute {
                node: second,
                name: "order".to_string(),
                reason: format!(
                    "order of length {} follows an order of length {}",
                    second_perm.len(),
                    first_perm.len()
                ),
            })?;

        let first_input = graph.input(first.in_port(0))?;
        let Some(last) = graph.out_data(second.out_port(0)) else {
            log::debug!("{}: {} has no output", self.name(), second);
            return Ok(false);
        };

        if composed.is_identity() {
            graph.move_consumers(last, first_input)?;
            graph.remove_node(second)?;
            graph.remove_node(last)?;
            graph.remove_node(mid)?;
            graph.remove_node(first)?;
        } else {
            let last_shape = graph.data(last)?.shape.clone();
            graph.move_consumers(last, mid)?;
            graph.remove_node(second)?;
            graph.remove_node(last)?;
            graph.op_mut(first)?.operation =
                Operation::Permute(PermuteConfig::new(composed.perm().to_vec()));
            graph.data_mut(mid)?.shape = last_shape;
        }
        Ok(true)
    }
}

fn order(graph: &Graph, op: NodeId) -> Result<&PermuteConfig, GraphError> {
    match &graph.op(op)?.operation {
        Operation::Permute(config) => Ok(config),
        _ => Err(GraphError::MissingAttribute {
            node: op,
            name: "order".to_string(),
        }),
    }
}
