#![allow(dead_code)]

use graph_ir::ir::{DataNode, Graph, NodeId, OpType, Operation, TensorData, TensorDataExt};

/// Graph input with a known shape; returns its data node.
pub fn input(graph: &mut Graph, name: &str, shape: Vec<usize>) -> NodeId {
    let op = graph.add_op(name, Operation::Parameter);
    let data = graph.add_data(format!("{name}:0"), DataNode::with_shape(shape));
    graph.connect_output(op.out_port(0), data).unwrap();
    data
}

/// f32 constant; returns its data node.
pub fn constant(graph: &mut Graph, name: &str, values: Vec<f32>, shape: Vec<usize>) -> NodeId {
    let op = graph.add_op(name, Operation::Const);
    let data = graph.add_data(
        format!("{name}:0"),
        DataNode::constant(TensorData::new(values, shape)),
    );
    graph.connect_output(op.out_port(0), data).unwrap();
    data
}

/// Operator reading `inputs` in port order, with a single output of unknown shape.
pub fn apply(graph: &mut Graph, name: &str, operation: Operation, inputs: &[NodeId]) -> NodeId {
    let op = graph.add_op(name, operation);
    for (port, &data) in inputs.iter().enumerate() {
        graph.connect_data(data, op.in_port(port)).unwrap();
    }
    let data = graph.add_data(format!("{name}:0"), DataNode::default());
    graph.connect_output(op.out_port(0), data).unwrap();
    data
}

pub fn sink(graph: &mut Graph, name: &str, data: NodeId) -> NodeId {
    let op = graph.add_op(name, Operation::Output);
    graph.connect_data(data, op.in_port(0)).unwrap();
    op
}

pub fn count_ops(graph: &Graph, op_type: OpType) -> usize {
    graph
        .nodes()
        .filter(|node| node.op_type() == Some(op_type))
        .count()
}

pub fn values(graph: &Graph, data: NodeId) -> Vec<f64> {
    graph
        .data(data)
        .unwrap()
        .value
        .as_ref()
        .unwrap_or_else(|| panic!("data node {data} has no value"))
        .to_f64_vec()
        .unwrap()
}

pub fn shape(graph: &Graph, data: NodeId) -> Vec<usize> {
    graph
        .data(data)
        .unwrap()
        .shape
        .clone()
        .unwrap_or_else(|| panic!("data node {data} has no shape"))
}
