use crate::error::GraphError;
use crate::ir::{Graph, Node, NodeId, OpType};

use super::RewriteRule;

/// Remove operators whose outputs are not consumed, and data nodes that have
/// neither a producer nor a consumer.
///
/// Graph inputs and outputs are never removed, and an operator without outputs
/// counts as a sink. Repeats until stable, since removing a node may make its
/// predecessors dead. Returns the number of nodes removed.
pub struct DeadNodeElimination;

impl RewriteRule for DeadNodeElimination {
    fn name(&self) -> &'static str {
        "DeadNodeElimination"
    }

    fn run_after(&self) -> Vec<&'static str> {
        vec!["TileReshaper", "FusePermutesSequence", "MulQuantizeFuse"]
    }

    fn find_and_replace(&self, graph: &mut Graph, _max_iterations: usize) -> Result<usize, GraphError> {
        let mut removed = 0;
        loop {
            let dead: Vec<NodeId> = graph
                .nodes()
                .filter(|node| is_dead(graph, node))
                .map(|node| node.id)
                .collect();
            if dead.is_empty() {
                break;
            }

            for id in dead {
                let node = graph.remove_node(id)?;
                log::debug!(
                    "Dead node elimination: {} '{}'",
                    node.kind(),
                    node.name
                );
                removed += 1;
            }
            // Removing nodes may expose new dead nodes, so loop again
        }
        Ok(removed)
    }
}

fn is_dead(graph: &Graph, node: &Node) -> bool {
    match node.op_type() {
        Some(OpType::Output | OpType::Parameter) => false,
        Some(_) => {
            let outputs = graph.outputs(node.id);
            !outputs.is_empty() && outputs.iter().all(|&data| graph.consumers(data).is_empty())
        }
        None => graph.producer(node.id).is_none() && graph.consumers(node.id).is_empty(),
    }
}
