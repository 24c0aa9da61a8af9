use burn_tensor::DType;

use crate::error::GraphError;
use crate::ir::{
    Graph, NodeId, OpType, Operation, TensorDataExt, broadcast_shapes, broadcast_to, float_tensor,
};
use crate::node::QuantizeConfig;
use crate::pattern::{Match, NodePredicate, Pattern};

use super::RewriteRule;

/// Fold a constant multiplier into the thresholds of a binary Quantize.
///
/// `Quantize(x * m)` with two levels compares `x * m` against the input range.
/// Dividing `min_in` / `max_in` by `m` moves the comparison onto `x`; where `m`
/// is negative the comparison flips, which is expressed by swapping `min_out`
/// and `max_out` at those positions. The Mul is then bypassed and removed.
pub struct MulQuantizeFuse;

/// A constant as flat `f64` values plus its shape.
#[derive(Debug, Clone, PartialEq)]
struct Constant {
    values: Vec<f64>,
    shape: Vec<usize>,
}

/// New thresholds, in port order: `min_in`, `max_in`, `min_out`, `max_out`.
type Thresholds = [Constant; 4];

impl RewriteRule for MulQuantizeFuse {
    fn name(&self) -> &'static str {
        "MulQuantizeFuse"
    }

    fn pattern(&self) -> Result<Option<Pattern>, GraphError> {
        Pattern::builder()
            .node("preop", NodePredicate::op(OpType::Mul))
            .node("preoped", NodePredicate::data())
            .node("quantize", NodePredicate::op(OpType::Quantize))
            .edge_port("preop", "preoped", 0)
            .edge_port("preoped", "quantize", 0)
            .build()
            .map(Some)
    }

    fn replace_pattern(&self, graph: &mut Graph, m: &Match) -> Result<bool, GraphError> {
        let preop = m.get("preop")?;
        let preoped = m.get("preoped")?;
        let quantize = m.get("quantize")?;

        let Operation::Quantize(config) = &graph.op(quantize)?.operation else {
            return Ok(false);
        };
        if !config.is_binary() {
            log::debug!("{}: {} has {} levels", self.name(), quantize, config.levels);
            return Ok(false);
        }
        if graph.consumers(preoped).len() != 1 {
            log::debug!("{}: {} has more than one consumer", self.name(), preoped);
            return Ok(false);
        }

        let ports = [
            QuantizeConfig::MIN_IN,
            QuantizeConfig::MAX_IN,
            QuantizeConfig::MIN_OUT,
            QuantizeConfig::MAX_OUT,
        ];
        let mut threshold_nodes = Vec::with_capacity(ports.len());
        for port in ports {
            let Some(data) = graph.in_data(quantize.in_port(port)) else {
                log::debug!("{}: {} input {} is not connected", self.name(), quantize, port);
                return Ok(false);
            };
            if graph.consumers(data).len() != 1 {
                log::debug!("{}: threshold {} is shared", self.name(), data);
                return Ok(false);
            }
            threshold_nodes.push(data);
        }

        let lhs = graph.input(preop.in_port(0))?;
        let rhs = graph.input(preop.in_port(1))?;
        let (tensor_port, multiplier) =
            match (graph.data(lhs)?.is_constant(), graph.data(rhs)?.is_constant()) {
                (false, true) => (0, rhs),
                (true, false) => (1, lhs),
                _ => {
                    log::debug!("{}: {} needs exactly one constant input", self.name(), preop);
                    return Ok(false);
                }
            };

        let Some(mul) = read_float(graph, multiplier)? else {
            log::debug!("{}: multiplier {} is not a float constant", self.name(), multiplier);
            return Ok(false);
        };
        if mul.values.contains(&0.0) {
            log::debug!("{}: multiplier {} contains zeros", self.name(), multiplier);
            return Ok(false);
        }

        // Quantize must see the same shape once the Mul is bypassed
        let tensor = if tensor_port == 0 { lhs } else { rhs };
        let Some(tensor_shape) = graph.data(tensor)?.resolved_shape() else {
            log::debug!("{}: shape of {} is unknown", self.name(), tensor);
            return Ok(false);
        };
        if !keeps_shape(&tensor_shape, &mul.shape) {
            log::debug!(
                "{}: multiplier {} broadcasts {:?} to a larger shape",
                self.name(),
                multiplier,
                tensor_shape
            );
            return Ok(false);
        }

        let mut thresholds = Vec::with_capacity(threshold_nodes.len());
        for &data in &threshold_nodes {
            let Some(constant) = read_float(graph, data)? else {
                log::debug!("{}: threshold {} is not a float constant", self.name(), data);
                return Ok(false);
            };
            thresholds.push((constant, dtype(graph, data)?));
        }
        let [min_in, max_in, min_out, max_out] = [0, 1, 2, 3].map(|i| thresholds[i].0.clone());

        let Some(folded) = fold_thresholds(&mul, [min_in, max_in, min_out, max_out]) else {
            log::debug!("{}: thresholds of {} do not broadcast", self.name(), quantize);
            return Ok(false);
        };
        if let Some(threshold) = folded
            .iter()
            .find(|threshold| !keeps_shape(&tensor_shape, &threshold.shape))
        {
            log::debug!(
                "{}: folded threshold of shape {:?} broadcasts {:?} to a larger shape",
                self.name(),
                threshold.shape,
                tensor_shape
            );
            return Ok(false);
        }

        // Build every new value before the first mutation.
        let mut values = Vec::with_capacity(folded.len());
        for (constant, (_, dtype)) in folded.into_iter().zip(&thresholds) {
            let tensor = float_tensor(constant.values, constant.shape.clone(), *dtype)?;
            values.push((tensor, constant.shape));
        }

        for (&data, (tensor, shape)) in threshold_nodes.iter().zip(values) {
            let node = graph.data_mut(data)?;
            node.value = Some(tensor);
            node.shape = Some(shape);
        }

        graph.disconnect(quantize.in_port(0))?;
        graph.set_destination(preop.in_port(tensor_port), quantize.in_port(0))?;
        graph.remove_node(preop)?;
        graph.remove_node(preoped)?;
        Ok(true)
    }
}

/// Float constant stored on a data node, `None` if there is no value or the
/// value is not a float.
fn read_float(graph: &Graph, data: NodeId) -> Result<Option<Constant>, GraphError> {
    let Some(value) = &graph.data(data)?.value else {
        return Ok(None);
    };
    if !matches!(value.dtype, DType::F32 | DType::F64) {
        return Ok(None);
    }
    Ok(Some(Constant {
        values: value.to_f64_vec()?,
        shape: value.shape_vec(),
    }))
}

/// Whether broadcasting `other` against `shape` leaves `shape` unchanged.
fn keeps_shape(shape: &[usize], other: &[usize]) -> bool {
    broadcast_shapes(shape, other).is_some_and(|result| result == shape)
}

fn dtype(graph: &Graph, data: NodeId) -> Result<DType, GraphError> {
    let node = graph.data(data)?;
    Ok(node
        .value
        .as_ref()
        .map(|value| value.dtype)
        .or(node.data_type)
        .unwrap_or(DType::F32))
}

/// Broadcast `mul`, `min_out` and `max_out` to a common shape and swap the
/// output thresholds wherever the multiplier is negative; divide the input
/// thresholds by the broadcast multiplier.
fn fold_thresholds(mul: &Constant, thresholds: Thresholds) -> Option<Thresholds> {
    let [min_in, max_in, min_out, max_out] = thresholds;

    let out_shape = broadcast_shapes(
        &broadcast_shapes(&mul.shape, &min_out.shape)?,
        &max_out.shape,
    )?;
    let mul_out = broadcast_to(&mul.values, &mul.shape, &out_shape)?;
    let mut new_min_out = broadcast_to(&min_out.values, &min_out.shape, &out_shape)?;
    let mut new_max_out = broadcast_to(&max_out.values, &max_out.shape, &out_shape)?;
    for (i, &factor) in mul_out.iter().enumerate() {
        if factor < 0.0 {
            std::mem::swap(&mut new_min_out[i], &mut new_max_out[i]);
        }
    }

    let divide = |threshold: &Constant| -> Option<Constant> {
        let shape = broadcast_shapes(&threshold.shape, &out_shape)?;
        let values = broadcast_to(&threshold.values, &threshold.shape, &shape)?;
        let factors = broadcast_to(&mul_out, &out_shape, &shape)?;
        Some(Constant {
            values: values.iter().zip(&factors).map(|(v, f)| v / f).collect(),
            shape,
        })
    };

    Some([
        divide(&min_in)?,
        divide(&max_in)?,
        Constant {
            values: new_min_out,
            shape: out_shape.clone(),
        },
        Constant {
            values: new_max_out,
            shape: out_shape,
        },
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::MAX_ITERATIONS;
    use crate::rewrite::tests::{constant, op, output, param, shape, values};
    use proptest::prelude::*;

    struct Fixture {
        graph: Graph,
        x: NodeId,
        quantize: NodeId,
        thresholds: [NodeId; 4],
    }

    fn fixture(
        mul: (Vec<f32>, Vec<usize>),
        min_in: (Vec<f32>, Vec<usize>),
        max_in: (Vec<f32>, Vec<usize>),
        min_out: (Vec<f32>, Vec<usize>),
        max_out: (Vec<f32>, Vec<usize>),
    ) -> Fixture {
        let mut graph = Graph::new();
        let x = param(&mut graph, "x", vec![1, 3, 2, 2]);
        let m = constant(&mut graph, "m", mul.0, mul.1);
        let (_, scaled) = op(&mut graph, "mul", Operation::Mul, &[x, m], Some(vec![1, 3, 2, 2]));
        let thresholds = [
            constant(&mut graph, "mi_i", min_in.0, min_in.1),
            constant(&mut graph, "ma_i", max_in.0, max_in.1),
            constant(&mut graph, "mi_o", min_out.0, min_out.1),
            constant(&mut graph, "ma_o", max_out.0, max_out.1),
        ];
        let mut inputs = vec![scaled];
        inputs.extend(thresholds);
        let (quantize, q) = op(
            &mut graph,
            "quantize",
            Operation::Quantize(QuantizeConfig::new(2)),
            &inputs,
            Some(vec![1, 3, 2, 2]),
        );
        output(&mut graph, "out", q);
        Fixture {
            graph,
            x,
            quantize,
            thresholds,
        }
    }

    fn scalar(value: f32) -> (Vec<f32>, Vec<usize>) {
        (vec![value], vec![1])
    }

    #[test]
    fn test_negative_scalar_multiplier() {
        let mut f = fixture(scalar(-1.0), scalar(-10.0), scalar(10.0), scalar(0.0), scalar(1.0));
        let rewrites = MulQuantizeFuse
            .find_and_replace(&mut f.graph, MAX_ITERATIONS)
            .unwrap();
        assert_eq!(rewrites, 1);
        f.graph.validate().unwrap();

        let [mi_i, ma_i, mi_o, ma_o] = f.thresholds;
        assert_eq!(values(&f.graph, mi_i), vec![10.0]);
        assert_eq!(values(&f.graph, ma_i), vec![-10.0]);
        assert_eq!(values(&f.graph, mi_o), vec![1.0]);
        assert_eq!(values(&f.graph, ma_o), vec![0.0]);

        assert_eq!(f.graph.in_data(f.quantize.in_port(0)), Some(f.x));
        assert!(f.graph.find("mul").is_none());
        assert!(f.graph.find("mul_out").is_none());
    }

    #[test]
    fn test_mixed_sign_multiplier_swaps_per_channel() {
        let mut f = fixture(
            (vec![-1.0, 1.0, -1.0], vec![3, 1, 1]),
            scalar(-10.0),
            scalar(10.0),
            (vec![0.0], vec![1, 1, 1, 1]),
            (vec![1.0], vec![1, 1, 1, 1]),
        );
        MulQuantizeFuse
            .find_and_replace(&mut f.graph, MAX_ITERATIONS)
            .unwrap();

        let [mi_i, ma_i, mi_o, ma_o] = f.thresholds;
        assert_eq!(values(&f.graph, mi_o), vec![1.0, 0.0, 1.0]);
        assert_eq!(values(&f.graph, ma_o), vec![0.0, 1.0, 0.0]);
        assert_eq!(shape(&f.graph, mi_o), vec![1, 3, 1, 1]);
        assert_eq!(shape(&f.graph, ma_o), vec![1, 3, 1, 1]);

        assert_eq!(values(&f.graph, mi_i), vec![10.0, -10.0, 10.0]);
        assert_eq!(values(&f.graph, ma_i), vec![-10.0, 10.0, -10.0]);
        assert_eq!(shape(&f.graph, mi_i), vec![1, 3, 1, 1]);
        assert_eq!(shape(&f.graph, ma_i), vec![1, 3, 1, 1]);
    }

    #[test]
    fn test_positive_multiplier_keeps_outputs() {
        let mut f = fixture(
            (vec![1.0, 1.0, 1.0], vec![3, 1, 1]),
            scalar(-10.0),
            scalar(10.0),
            scalar(0.0),
            scalar(1.0),
        );
        MulQuantizeFuse
            .find_and_replace(&mut f.graph, MAX_ITERATIONS)
            .unwrap();

        let [mi_i, ma_i, mi_o, ma_o] = f.thresholds;
        assert_eq!(values(&f.graph, mi_i), vec![-10.0; 3]);
        assert_eq!(values(&f.graph, ma_i), vec![10.0; 3]);
        assert_eq!(values(&f.graph, mi_o), vec![0.0; 3]);
        assert_eq!(values(&f.graph, ma_o), vec![1.0; 3]);
    }

    #[test]
    fn test_shared_mul_output_untouched() {
        let mut f = fixture(scalar(-1.0), scalar(-10.0), scalar(10.0), scalar(0.0), scalar(1.0));
        let scaled = f.graph.find("mul_out").unwrap();
        output(&mut f.graph, "side", scaled);
        let before = f.graph.len();

        let rewrites = MulQuantizeFuse
            .find_and_replace(&mut f.graph, MAX_ITERATIONS)
            .unwrap();
        assert_eq!(rewrites, 0);
        assert_eq!(f.graph.len(), before);
        assert_eq!(values(&f.graph, f.thresholds[0]), vec![-10.0]);
    }

    #[test]
    fn test_shared_threshold_untouched() {
        let mut f = fixture(scalar(-1.0), scalar(-10.0), scalar(10.0), scalar(0.0), scalar(1.0));
        output(&mut f.graph, "side", f.thresholds[2]);
        let rewrites = MulQuantizeFuse
            .find_and_replace(&mut f.graph, MAX_ITERATIONS)
            .unwrap();
        assert_eq!(rewrites, 0);
    }

    #[test]
    fn test_multiplier_widening_tensor_untouched() {
        // x[3] * m[2, 3] has shape [2, 3]; dropping the Mul would shrink it
        let mut graph = Graph::new();
        let x = param(&mut graph, "x", vec![3]);
        let m = constant(&mut graph, "m", vec![-1.0; 6], vec![2, 3]);
        let (mul, scaled) = op(&mut graph, "mul", Operation::Mul, &[x, m], Some(vec![2, 3]));
        let mut inputs = vec![scaled];
        inputs.extend([
            constant(&mut graph, "mi_i", vec![-10.0], vec![1]),
            constant(&mut graph, "ma_i", vec![10.0], vec![1]),
            constant(&mut graph, "mi_o", vec![0.0], vec![1]),
            constant(&mut graph, "ma_o", vec![1.0], vec![1]),
        ]);
        let (quantize, q) = op(
            &mut graph,
            "quantize",
            Operation::Quantize(QuantizeConfig::new(2)),
            &inputs,
            Some(vec![2, 3]),
        );
        output(&mut graph, "out", q);

        let rewrites = MulQuantizeFuse
            .find_and_replace(&mut graph, MAX_ITERATIONS)
            .unwrap();
        assert_eq!(rewrites, 0);
        assert!(graph.contains(mul));
        assert_eq!(graph.in_data(quantize.in_port(0)), Some(scaled));
        assert_eq!(values(&graph, inputs[1]), vec![-10.0]);

        crate::phases::infer_shapes(&mut graph).unwrap();
        assert_eq!(shape(&graph, q), vec![2, 3]);
    }

    #[test]
    fn test_threshold_widening_tensor_untouched() {
        let mut f = fixture(
            scalar(-1.0),
            (vec![-10.0, -5.0], vec![2, 1, 1, 1, 1]),
            scalar(10.0),
            scalar(0.0),
            scalar(1.0),
        );
        let rewrites = MulQuantizeFuse
            .find_and_replace(&mut f.graph, MAX_ITERATIONS)
            .unwrap();
        assert_eq!(rewrites, 0);
        assert_eq!(values(&f.graph, f.thresholds[0]), vec![-10.0, -5.0]);
        assert_eq!(values(&f.graph, f.thresholds[3]), vec![1.0]);
    }

    #[test]
    fn test_non_binary_quantize_untouched() {
        let mut f = fixture(scalar(-1.0), scalar(-10.0), scalar(10.0), scalar(0.0), scalar(1.0));
        f.graph.op_mut(f.quantize).unwrap().operation =
            Operation::Quantize(QuantizeConfig::new(256));
        let rewrites = MulQuantizeFuse
            .find_and_replace(&mut f.graph, MAX_ITERATIONS)
            .unwrap();
        assert_eq!(rewrites, 0);
    }

    fn constant_strategy(shape: Vec<usize>, range: std::ops::Range<f64>) -> impl Strategy<Value = Constant> {
        let len = shape.iter().product::<usize>();
        proptest::collection::vec(range, len).prop_map(move |values| Constant {
            values,
            shape: shape.clone(),
        })
    }

    proptest! {
        #[test]
        fn prop_all_negative_matches_wholesale_swap(
            mul in constant_strategy(vec![3, 1, 1], -8.0..-0.5),
            min_out in constant_strategy(vec![1, 3, 1, 1], -4.0..4.0),
            max_out in constant_strategy(vec![1, 1, 1, 1], -4.0..4.0),
            min_in in constant_strategy(vec![1], -10.0..10.0),
            max_in in constant_strategy(vec![1], -10.0..10.0),
        ) {
            let [_, _, new_min_out, new_max_out] = fold_thresholds(
                &mul,
                [min_in, max_in, min_out.clone(), max_out.clone()],
            )
            .unwrap();

            let target = [1, 3, 1, 1];
            let swapped_min = broadcast_to(&max_out.values, &max_out.shape, &target).unwrap();
            let swapped_max = broadcast_to(&min_out.values, &min_out.shape, &target).unwrap();
            prop_assert_eq!(new_min_out.values, swapped_min);
            prop_assert_eq!(new_max_out.values, swapped_max);
        }
    }
}
