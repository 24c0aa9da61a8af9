//! Arena-backed graph
//!
//! Nodes and edges live in two arenas indexed by [`NodeId`] and [`EdgeId`].
//! Removal leaves a hole, so ids stay valid (and unambiguous) for the whole life
//! of the graph. Every mutation is validated before it is committed:
//!
//! - edges alternate between operator and data nodes,
//! - a data node has at most one producer,
//! - an input port holds at most one edge,
//! - the graph stays acyclic.

use std::cell::OnceCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use crate::error::GraphError;

use super::node::{DataNode, Node, NodeId, NodeKind, NodePayload, OpNode, Operation};

/// Tensor layout the graph is expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    #[default]
    Nchw,
    Nhwc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(usize);

/// A directed edge. For `op -> data` edges `src_port` is the output port of the
/// operator; for `data -> op` edges `dst_port` is the input port of the operator.
/// The port on the data side is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub src: NodeId,
    pub src_port: usize,
    pub dst: NodeId,
    pub dst_port: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
    in_edges: Vec<Vec<EdgeId>>,
    out_edges: Vec<Vec<EdgeId>>,
    names: HashMap<String, NodeId>,
    topo: OnceCell<Vec<NodeId>>,
    pub layout: Layout,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(layout: Layout) -> Self {
        Self {
            layout,
            ..Default::default()
        }
    }

    /// Add a node. A name already in use is replaced by [`Graph::unique_name`]
    /// so that every node stays reachable through [`Graph::find`].
    pub fn add_node(&mut self, name: impl Into<String>, payload: NodePayload) -> NodeId {
        let id = NodeId(self.nodes.len());
        let mut name = name.into();
        if self.names.contains_key(&name) {
            let renamed = self.unique_name(&name);
            log::warn!("Node name '{}' is already taken, using '{}'", name, renamed);
            name = renamed;
        }
        self.names.insert(name.clone(), id);
        self.nodes.push(Some(Node {
            id,
            name,
            payload,
            attrs: HashMap::new(),
        }));
        self.in_edges.push(Vec::new());
        self.out_edges.push(Vec::new());
        self.invalidate();
        id
    }

    pub fn add_op(&mut self, name: impl Into<String>, operation: Operation) -> NodeId {
        self.add_node(name, NodePayload::Op(OpNode::new(operation)))
    }

    pub fn add_data(&mut self, name: impl Into<String>, data: DataNode) -> NodeId {
        self.add_node(name, NodePayload::Data(data))
    }

    /// Return `base` if no node uses it yet, otherwise `base_<n>` for the first free `n`.
    pub fn unique_name(&self, base: &str) -> String {
        if !self.names.contains_key(base) {
            return base.to_string();
        }
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !self.names.contains_key(candidate))
            .unwrap_or_else(|| base.to_string())
    }

    pub fn contains(&self, id: NodeId) -> bool {
        matches!(self.nodes.get(id.0), Some(Some(_)))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(GraphError::MissingNode(id))
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(GraphError::MissingNode(id))
    }

    pub fn op(&self, id: NodeId) -> Result<&OpNode, GraphError> {
        let node = self.node(id)?;
        node.as_op().ok_or(GraphError::KindMismatch {
            node: id,
            expected: NodeKind::Op,
            actual: NodeKind::Data,
        })
    }

    pub fn op_mut(&mut self, id: NodeId) -> Result<&mut OpNode, GraphError> {
        match &mut self.node_mut(id)?.payload {
            NodePayload::Op(op) => Ok(op),
            NodePayload::Data(_) => Err(GraphError::KindMismatch {
                node: id,
                expected: NodeKind::Op,
                actual: NodeKind::Data,
            }),
        }
    }

    pub fn data(&self, id: NodeId) -> Result<&DataNode, GraphError> {
        let node = self.node(id)?;
        node.as_data().ok_or(GraphError::KindMismatch {
            node: id,
            expected: NodeKind::Data,
            actual: NodeKind::Op,
        })
    }

    /// Mutable access to a data node's metadata. Shape and value edits do not
    /// change the topology, so the cached order is kept.
    pub fn data_mut(&mut self, id: NodeId) -> Result<&mut DataNode, GraphError> {
        match &mut self.node_mut(id)?.payload {
            NodePayload::Data(data) => Ok(data),
            NodePayload::Op(_) => Err(GraphError::KindMismatch {
                node: id,
                expected: NodeKind::Data,
                actual: NodeKind::Op,
            }),
        }
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names
            .get(name)
            .copied()
            .filter(|&id| self.contains(id))
    }

    /// Live node ids in ascending order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().flatten().map(|node| node.id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> + '_ {
        self.nodes.iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn op_count(&self) -> usize {
        self.nodes().filter(|node| node.is_op()).count()
    }

    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.0).and_then(Option::as_ref)
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(i, edge)| edge.as_ref().map(|edge| (EdgeId(i), edge)))
    }

    pub fn in_edges(&self, id: NodeId) -> &[EdgeId] {
        self.in_edges.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn out_edges(&self, id: NodeId) -> &[EdgeId] {
        self.out_edges.get(id.0).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Direct predecessors, ordered by the input port they feed.
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        let mut edges: Vec<&Edge> = self
            .in_edges(id)
            .iter()
            .filter_map(|&e| self.edge(e))
            .collect();
        edges.sort_by_key(|edge| edge.dst_port);
        edges.into_iter().map(|edge| edge.src).collect()
    }

    /// Direct successors, ordered by the output port they hang off.
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        let mut edges: Vec<&Edge> = self
            .out_edges(id)
            .iter()
            .filter_map(|&e| self.edge(e))
            .collect();
        edges.sort_by_key(|edge| (edge.src_port, edge.dst.0));
        edges.into_iter().map(|edge| edge.dst).collect()
    }

    /// Add an edge after checking every structural invariant.
    pub fn add_edge(
        &mut self,
        src: NodeId,
        src_port: usize,
        dst: NodeId,
        dst_port: usize,
    ) -> Result<EdgeId, GraphError> {
        let edge = self.check_edge(src, src_port, dst, dst_port)?;
        Ok(self.insert_edge(edge))
    }

    /// Validate a would-be edge and normalize its data-side port to 0.
    pub(crate) fn check_edge(
        &self,
        src: NodeId,
        src_port: usize,
        dst: NodeId,
        dst_port: usize,
    ) -> Result<Edge, GraphError> {
        let src_kind = self.node(src)?.kind();
        let dst_kind = self.node(dst)?.kind();

        if src_kind == dst_kind {
            return Err(GraphError::InvalidTopology(format!(
                "cannot connect {src_kind} node {src} to {dst_kind} node {dst}"
            )));
        }

        let edge = match src_kind {
            NodeKind::Op => {
                if let Some(producer) = self.producer_edge(dst) {
                    return Err(GraphError::InvalidTopology(format!(
                        "data node {dst} already has producer {}",
                        producer.src
                    )));
                }
                if self.out_edge_at(src, src_port).is_some() {
                    return Err(GraphError::InvalidTopology(format!(
                        "output port {src_port} of node {src} already produces a data node"
                    )));
                }
                Edge {
                    src,
                    src_port,
                    dst,
                    dst_port: 0,
                }
            }
            NodeKind::Data => {
                if self.in_edge_at(dst, dst_port).is_some() {
                    return Err(GraphError::PortInUse {
                        node: dst,
                        port: dst_port,
                    });
                }
                Edge {
                    src,
                    src_port: 0,
                    dst,
                    dst_port,
                }
            }
        };

        if src == dst || self.reaches(dst, src) {
            return Err(GraphError::Cycle { from: src, to: dst });
        }

        Ok(edge)
    }

    pub(crate) fn insert_edge(&mut self, edge: Edge) -> EdgeId {
        let id = EdgeId(self.edges.len());
        self.edges.push(Some(edge));
        self.out_edges[edge.src.0].push(id);
        self.in_edges[edge.dst.0].push(id);
        self.invalidate();
        id
    }

    /// Remove an edge. Removing the producer edge of a data node that still has
    /// consumers is rejected, unless the data node is a constant.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<Edge, GraphError> {
        let edge = *self.edge(id).ok_or_else(|| {
            GraphError::InvalidTopology(format!("edge {} does not exist", id.0))
        })?;

        if self.node(edge.src)?.is_op() && self.would_dangle(edge.dst)? {
            return Err(GraphError::DanglingData(edge.dst));
        }

        self.detach_edge(id).ok_or_else(|| {
            GraphError::InvalidTopology(format!("edge {} does not exist", id.0))
        })
    }

    /// Unchecked removal; callers have validated the mutation already.
    pub(crate) fn detach_edge(&mut self, id: EdgeId) -> Option<Edge> {
        let edge = self.edges.get_mut(id.0)?.take()?;
        self.out_edges[edge.src.0].retain(|&e| e != id);
        self.in_edges[edge.dst.0].retain(|&e| e != id);
        self.invalidate();
        Some(edge)
    }

    /// Remove a node and all of its edges.
    ///
    /// Rejected when it would leave a dangling read: a data node that still has
    /// consumers, or an operator whose non-constant outputs are still consumed.
    pub fn remove_node(&mut self, id: NodeId) -> Result<Node, GraphError> {
        let node = self.node(id)?;
        match node.kind() {
            NodeKind::Data => {
                if self.consumer_count(id) > 0 {
                    return Err(GraphError::InvalidTopology(format!(
                        "data node {id} ('{}') still has consumers",
                        node.name
                    )));
                }
            }
            NodeKind::Op => {
                for data in self.successors(id) {
                    if self.would_dangle(data)? {
                        return Err(GraphError::DanglingData(data));
                    }
                }
            }
        }

        let incident: Vec<EdgeId> = self
            .in_edges(id)
            .iter()
            .chain(self.out_edges(id))
            .copied()
            .collect();
        for edge in incident {
            self.detach_edge(edge);
        }

        let node = self.nodes[id.0].take().ok_or(GraphError::MissingNode(id))?;
        if self.names.get(&node.name) == Some(&id) {
            self.names.remove(&node.name);
        }
        self.invalidate();
        Ok(node)
    }

    /// Topological order of all live nodes, computed lazily and cached until
    /// the next structural mutation. Ties are broken by node id.
    pub fn topological_order(&self) -> &[NodeId] {
        self.topo.get_or_init(|| self.compute_topological_order())
    }

    fn compute_topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: HashMap<NodeId, usize> = self
            .node_ids()
            .map(|id| (id, self.in_edges(id).len()))
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeId>> = in_degree
            .iter()
            .filter(|&(_, &degree)| degree == 0)
            .map(|(&id, _)| Reverse(id))
            .collect();

        let mut order = Vec::with_capacity(in_degree.len());
        while let Some(Reverse(id)) = ready.pop() {
            order.push(id);
            for &edge in self.out_edges(id) {
                let Some(edge) = self.edge(edge) else {
                    continue;
                };
                if let Some(degree) = in_degree.get_mut(&edge.dst) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(edge.dst));
                    }
                }
            }
        }

        // add_edge rejects cycles, so every node is emitted.
        debug_assert_eq!(order.len(), in_degree.len(), "graph contains a cycle");
        order
    }

    /// `true` if `to` is reachable from `from` following edge direction.
    pub fn reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            stack.extend(
                self.out_edges(id)
                    .iter()
                    .filter_map(|&e| self.edge(e))
                    .map(|edge| edge.dst),
            );
        }
        false
    }

    /// Check every structural invariant of the whole graph.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (_, edge) in self.edges() {
            let src = self.node(edge.src)?;
            let dst = self.node(edge.dst)?;
            if src.kind() == dst.kind() {
                return Err(GraphError::InvalidTopology(format!(
                    "edge {} -> {} connects two {} nodes",
                    edge.src,
                    edge.dst,
                    src.kind()
                )));
            }
        }

        for node in self.nodes() {
            match node.kind() {
                NodeKind::Data => {
                    let producers = self.in_edges(node.id).len();
                    if producers > 1 {
                        return Err(GraphError::InvalidTopology(format!(
                            "data node {} has {producers} producers",
                            node.id
                        )));
                    }
                }
                NodeKind::Op => {
                    let mut ports = HashSet::new();
                    for edge in self.in_edges(node.id).iter().filter_map(|&e| self.edge(e)) {
                        if !ports.insert(edge.dst_port) {
                            return Err(GraphError::PortInUse {
                                node: node.id,
                                port: edge.dst_port,
                            });
                        }
                    }
                }
            }
        }

        if self.compute_topological_order().len() != self.len() {
            return Err(GraphError::InvalidTopology(
                "graph contains a cycle".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn producer_edge(&self, data: NodeId) -> Option<&Edge> {
        self.in_edges(data).iter().find_map(|&e| self.edge(e))
    }

    pub(crate) fn in_edge_at(&self, op: NodeId, port: usize) -> Option<EdgeId> {
        self.in_edges(op)
            .iter()
            .copied()
            .find(|&e| self.edge(e).is_some_and(|edge| edge.dst_port == port))
    }

    pub(crate) fn out_edge_at(&self, op: NodeId, port: usize) -> Option<EdgeId> {
        self.out_edges(op)
            .iter()
            .copied()
            .find(|&e| self.edge(e).is_some_and(|edge| edge.src_port == port))
    }

    pub(crate) fn consumer_count(&self, data: NodeId) -> usize {
        self.out_edges(data).len()
    }

    /// A data node dangles when it would lose its producer while still feeding
    /// consumers and not being a constant.
    fn would_dangle(&self, data: NodeId) -> Result<bool, GraphError> {
        Ok(self.consumer_count(data) > 0 && !self.data(data)?.is_constant())
    }

    fn invalidate(&mut self) {
        self.topo.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::DataNode;

    /// param -> x -> relu -> y
    fn chain() -> (Graph, NodeId, NodeId, NodeId, NodeId) {
        let mut graph = Graph::new();
        let param = graph.add_op("param", Operation::Parameter);
        let x = graph.add_data("x", DataNode::with_shape(vec![1, 3]));
        let relu = graph.add_op("relu", Operation::Custom("Relu".to_string()));
        let y = graph.add_data("y", DataNode::default());
        graph.add_edge(param, 0, x, 0).unwrap();
        graph.add_edge(x, 0, relu, 0).unwrap();
        graph.add_edge(relu, 0, y, 0).unwrap();
        (graph, param, x, relu, y)
    }

    #[test]
    fn test_topological_order_follows_edges() {
        let (graph, param, x, relu, y) = chain();
        assert_eq!(graph.topological_order(), &[param, x, relu, y]);
    }

    #[test]
    fn test_cycle_rejected() {
        let (mut graph, _, _, relu, y) = chain();
        let result = graph.add_edge(y, 0, relu, 1);
        assert_eq!(result, Err(GraphError::Cycle { from: y, to: relu }));
        // Nothing was committed
        assert!(graph.in_edge_at(relu, 1).is_none());
        graph.validate().unwrap();
    }

    #[test]
    fn test_op_to_op_edge_rejected() {
        let (mut graph, param, _, relu, _) = chain();
        let result = graph.add_edge(param, 1, relu, 1);
        assert!(matches!(result, Err(GraphError::InvalidTopology(_))));
    }

    #[test]
    fn test_second_producer_rejected() {
        let (mut graph, _, x, _, _) = chain();
        let other = graph.add_op("other", Operation::Parameter);
        let result = graph.add_edge(other, 0, x, 0);
        assert!(matches!(result, Err(GraphError::InvalidTopology(_))));
    }

    #[test]
    fn test_port_in_use_rejected() {
        let (mut graph, _, _, relu, _) = chain();
        let z = graph.add_data("z", DataNode::default());
        assert_eq!(
            graph.add_edge(z, 0, relu, 0),
            Err(GraphError::PortInUse {
                node: relu,
                port: 0
            })
        );
    }

    #[test]
    fn test_removing_producer_of_consumed_data_rejected() {
        let (mut graph, param, x, _, _) = chain();
        let edge = graph.out_edge_at(param, 0).unwrap();
        assert_eq!(graph.remove_edge(edge), Err(GraphError::DanglingData(x)));
        assert_eq!(graph.remove_node(param).unwrap_err(), GraphError::DanglingData(x));
    }

    #[test]
    fn test_remove_node_invalidates_order() {
        let (mut graph, param, x, relu, y) = chain();
        assert_eq!(graph.topological_order().len(), 4);
        graph.remove_node(y).unwrap();
        graph.remove_node(relu).unwrap();
        assert_eq!(graph.topological_order(), &[param, x]);
        assert!(!graph.contains(relu));
        assert_eq!(graph.find("relu"), None);
    }

    #[test]
    fn test_unique_name() {
        let (graph, ..) = chain();
        assert_eq!(graph.unique_name("fresh"), "fresh");
        assert_eq!(graph.unique_name("relu"), "relu_1");
    }

    #[test]
    fn test_reused_name_keeps_both_nodes_reachable() {
        let (mut graph, _, _, relu, _) = chain();
        let other = graph.add_op("relu", Operation::Custom("Relu".to_string()));

        assert_eq!(graph.find("relu"), Some(relu));
        assert_eq!(graph.find("relu_1"), Some(other));
        assert_eq!(graph.node(other).unwrap().name, "relu_1");
    }

    #[test]
    fn test_kind_mismatch() {
        let (graph, _, x, relu, _) = chain();
        assert!(matches!(
            graph.op(x),
            Err(GraphError::KindMismatch {
                expected: NodeKind::Op,
                ..
            })
        ));
        assert!(graph.data(relu).is_err());
    }
}
