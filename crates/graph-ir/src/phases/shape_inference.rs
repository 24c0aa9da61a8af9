//! Shape inference sweep
//!
//! Walks the graph in topological order and calls each operator's inference
//! capability, writing the results onto its output data nodes. Operators
//! without a capability keep the shapes already stored on their outputs.

use crate::error::GraphError;
use crate::ir::Graph;

/// Infer and store the shape of every operator output. Returns the number of
/// data nodes whose shape changed.
pub fn infer_shapes(graph: &mut Graph) -> Result<usize, GraphError> {
    let order = graph.topological_order().to_vec();
    let mut changed = 0;

    for id in order {
        let Some(infer) = graph.node(id)?.as_op().and_then(|op| op.infer) else {
            continue;
        };
        let shapes = infer(graph, id)?;

        for (port, shape) in shapes.into_iter().enumerate() {
            let Some(data) = graph.out_data(id.out_port(port)) else {
                continue;
            };
            let node = graph.data_mut(data)?;
            if node.shape.as_ref() != Some(&shape) {
                log::debug!("Shape inference: {} output {} -> {:?}", id, port, shape);
                node.shape = Some(shape);
                changed += 1;
            }
        }
    }
    Ok(changed)
}
