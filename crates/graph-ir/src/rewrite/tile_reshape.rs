use crate::error::GraphError;
use crate::ir::{DataNode, Graph, OpType, Operation};
use crate::node::{ReshapeConfig, TileConfig};
use crate::pattern::{Match, NodePredicate, Pattern};

use super::RewriteRule;

/// Rank accepted by tile kernels.
const LEGAL_RANK: usize = 4;

/// Legalize rank-3 Tile operators.
///
/// A Tile whose input and output rank is one below [`LEGAL_RANK`] and whose axis
/// is not the last one is wrapped as `Reshape(in + [1]) -> Tile -> Reshape(out)`.
/// The trailing unit axis does not change which axis is tiled, so the
/// end-to-end shape stays the same.
pub struct TileReshaper;

impl RewriteRule for TileReshaper {
    fn name(&self) -> &'static str {
        "TileReshaper"
    }

    fn pattern(&self) -> Result<Option<Pattern>, GraphError> {
        Pattern::builder()
            .node("tile", NodePredicate::op(OpType::Tile))
            .build()
            .map(Some)
    }

    fn replace_pattern(&self, graph: &mut Graph, m: &Match) -> Result<bool, GraphError> {
        let tile = m.get("tile")?;
        let Operation::Tile(TileConfig { axis, .. }) = graph.op(tile)?.operation else {
            return Ok(false);
        };

        let in_data = graph.input(tile.in_port(0))?;
        let Some(tile_data) = graph.out_data(tile.out_port(0)) else {
            log::debug!("{}: {} has no output", self.name(), tile);
            return Ok(false);
        };

        let input = graph.data(in_data)?;
        let output = graph.data(tile_data)?;
        let (Some(in_shape), Some(out_shape)) = (input.resolved_shape(), output.resolved_shape())
        else {
            log::debug!("{}: shapes around {} are unknown", self.name(), tile);
            return Ok(false);
        };
        if in_shape.len() != LEGAL_RANK - 1 || out_shape.len() != LEGAL_RANK - 1 {
            return Ok(false);
        }
        if axis >= in_shape.len() {
            return Err(GraphError::InvalidAttribute {
                node: tile,
                name: "axis".to_string(),
                reason: format!("axis {axis} is out of range for rank {}", in_shape.len()),
            });
        }
        if axis + 1 == in_shape.len() {
            log::debug!("{}: {} tiles the last axis", self.name(), tile);
            return Ok(false);
        }
        let in_type = input.data_type;
        let out_type = output.data_type;

        let mut expanded_in = in_shape;
        expanded_in.push(1);
        let mut expanded_out = out_shape.clone();
        expanded_out.push(1);

        let tile_name = graph.node(tile)?.name.clone();

        // Reshape before: in -> in + [1]
        let reshape_before = graph.add_op(
            graph.unique_name(&format!("{tile_name}/Reshape_before")),
            Operation::Reshape(ReshapeConfig::to_shape(&expanded_in)),
        );
        let before_data = graph.add_data(
            graph.unique_name(&format!("{tile_name}/Reshape_before_data")),
            DataNode {
                shape: Some(expanded_in),
                value: None,
                data_type: in_type,
            },
        );

        // Reshape after: out + [1] -> out
        let reshape_after = graph.add_op(
            graph.unique_name(&format!("{tile_name}/Reshape_after")),
            Operation::Reshape(ReshapeConfig::to_shape(&out_shape)),
        );
        let after_data = graph.add_data(
            graph.unique_name(&format!("{tile_name}/Reshape_after_data")),
            DataNode {
                shape: Some(out_shape),
                value: None,
                data_type: out_type,
            },
        );

        // The new nodes are unconnected, so none of these edges can close a cycle.
        graph.connect_output(reshape_before.out_port(0), before_data)?;
        graph.connect_output(reshape_after.out_port(0), after_data)?;
        graph.move_consumers(tile_data, after_data)?;
        graph.set_destination(tile.in_port(0), reshape_before.in_port(0))?;
        graph.connect_data(before_data, tile.in_port(0))?;
        graph.connect_data(tile_data, reshape_after.in_port(0))?;
        graph.data_mut(tile_data)?.shape = Some(expanded_out);

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeId;
    use crate::phases::infer_shapes;
    use crate::rewrite::tests::{op, output, param, shape};

    const MAX: usize = crate::rewrite::MAX_ITERATIONS;

    fn tile_graph(in_shape: Vec<usize>, axis: usize, tiles: usize) -> (Graph, NodeId, NodeId) {
        let mut graph = Graph::new();
        let x = param(&mut graph, "x", in_shape.clone());
        let mut out_shape = in_shape;
        out_shape[axis] *= tiles;
        let (tile, y) = op(
            &mut graph,
            "tile",
            Operation::Tile(TileConfig::new(axis, tiles)),
            &[x],
            Some(out_shape),
        );
        output(&mut graph, "out", y);
        (graph, tile, y)
    }

    #[test]
    fn test_rank3_tile_is_wrapped() {
        let (mut graph, tile, y) = tile_graph(vec![1, 3, 4], 1, 3);
        assert_eq!(TileReshaper.find_and_replace(&mut graph, MAX).unwrap(), 1);
        graph.validate().unwrap();

        let before = graph.find("tile/Reshape_before").unwrap();
        let after = graph.find("tile/Reshape_after").unwrap();
        assert_eq!(
            graph.op(before).unwrap().operation,
            Operation::Reshape(ReshapeConfig::new(vec![1, 3, 4, 1]))
        );
        assert_eq!(
            graph.op(after).unwrap().operation,
            Operation::Reshape(ReshapeConfig::new(vec![1, 9, 4]))
        );

        // x -> before -> tile -> after -> out
        let x = graph.find("x_out").unwrap();
        assert_eq!(graph.consumers(x), vec![before.in_port(0)]);
        let before_data = graph.in_data(tile.in_port(0)).unwrap();
        assert_eq!(graph.producer(before_data), Some(before.out_port(0)));
        assert_eq!(shape(&graph, before_data), vec![1, 3, 4, 1]);
        assert_eq!(shape(&graph, y), vec![1, 9, 4, 1]);
        assert_eq!(graph.consumers(y), vec![after.in_port(0)]);

        let out = graph.find("out").unwrap();
        let after_data = graph.in_data(out.in_port(0)).unwrap();
        assert_eq!(graph.producer(after_data), Some(after.out_port(0)));
        assert_eq!(shape(&graph, after_data), vec![1, 9, 4]);
    }

    #[test]
    fn test_shapes_survive_inference() {
        let (mut graph, _, _) = tile_graph(vec![2, 5, 7], 0, 2);
        TileReshaper.find_and_replace(&mut graph, MAX).unwrap();
        let expected: Vec<_> = graph
            .nodes()
            .filter_map(|node| node.as_data().map(|data| (node.id, data.shape.clone())))
            .collect();

        infer_shapes(&mut graph).unwrap();
        for (id, shape) in expected {
            assert_eq!(graph.data(id).unwrap().shape, shape);
        }
    }

    #[test]
    fn test_last_axis_untouched() {
        let (mut graph, _, _) = tile_graph(vec![1, 3, 4], 2, 2);
        let before = graph.len();
        assert_eq!(TileReshaper.find_and_replace(&mut graph, MAX).unwrap(), 0);
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_out_of_range_axis_is_error() {
        let mut graph = Graph::new();
        let x = param(&mut graph, "x", vec![1, 3, 4]);
        let (_, y) = op(
            &mut graph,
            "tile",
            Operation::Tile(TileConfig::new(5, 2)),
            &[x],
            Some(vec![1, 3, 4]),
        );
        output(&mut graph, "out", y);
        let before = graph.len();

        assert!(matches!(
            TileReshaper.find_and_replace(&mut graph, MAX),
            Err(GraphError::InvalidAttribute { .. })
        ));
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn test_legal_rank_untouched() {
        let (mut graph, _, _) = tile_graph(vec![1, 3, 4, 4], 1, 2);
        assert_eq!(TileReshaper.find_and_replace(&mut graph, MAX).unwrap(), 0);
    }
}
