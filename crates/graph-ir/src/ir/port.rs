//! Ports and connections
//!
//! Rules address "input `k` of operator `X`" through [`InPort`] and
//! "output `k` of operator `X`" through [`OutPort`]. Both are plain
//! `(node, index)` values; every operation on them goes through the [`Graph`],
//! which validates the full mutation before committing any edge change.

use derive_new::new;

use crate::error::GraphError;

use super::graph::{Edge, Graph};
use super::node::{DataNode, NodeId, NodeKind};

/// Input slot of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, new)]
pub struct InPort {
    pub node: NodeId,
    pub idx: usize,
}

/// Output slot of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, new)]
pub struct OutPort {
    pub node: NodeId,
    pub idx: usize,
}

/// Snapshot of everything attached to one data node: its producer (if any) and
/// all consumer ports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub data: NodeId,
    pub source: Option<OutPort>,
    pub destinations: Vec<InPort>,
}

impl Graph {
    /// Data node feeding `port`, if connected.
    pub fn in_data(&self, port: InPort) -> Option<NodeId> {
        self.in_edge_at(port.node, port.idx)
            .and_then(|e| self.edge(e))
            .map(|edge| edge.src)
    }

    /// Data node produced at `port`, if any.
    pub fn out_data(&self, port: OutPort) -> Option<NodeId> {
        self.out_edge_at(port.node, port.idx)
            .and_then(|e| self.edge(e))
            .map(|edge| edge.dst)
    }

    /// Like [`Graph::in_data`], but a missing connection is an error.
    pub fn input(&self, port: InPort) -> Result<NodeId, GraphError> {
        self.in_data(port).ok_or(GraphError::PortNotConnected {
            node: port.node,
            port: port.idx,
        })
    }

    /// Output port producing `data`.
    pub fn producer(&self, data: NodeId) -> Option<OutPort> {
        self.producer_edge(data)
            .map(|edge| OutPort::new(edge.src, edge.src_port))
    }

    /// Output port the data feeding `port` comes from. Only data-node indirection
    /// is followed; operators are never skipped.
    pub fn source(&self, port: InPort) -> Option<OutPort> {
        self.in_data(port).and_then(|data| self.producer(data))
    }

    /// Consumer ports of a data node, ordered by node id then port.
    pub fn consumers(&self, data: NodeId) -> Vec<InPort> {
        let mut ports: Vec<InPort> = self
            .out_edges(data)
            .iter()
            .filter_map(|&e| self.edge(e))
            .map(|edge| InPort::new(edge.dst, edge.dst_port))
            .collect();
        ports.sort();
        ports
    }

    /// Connected input ports of an operator, ordered by index.
    pub fn connected_inputs(&self, op: NodeId) -> Vec<InPort> {
        let mut ports: Vec<InPort> = self
            .in_edges(op)
            .iter()
            .filter_map(|&e| self.edge(e))
            .map(|edge| InPort::new(op, edge.dst_port))
            .collect();
        ports.sort();
        ports
    }

    /// Data nodes produced by an operator, ordered by output port.
    pub fn outputs(&self, op: NodeId) -> Vec<NodeId> {
        self.successors(op)
    }

    pub fn connection(&self, data: NodeId) -> Result<Connection, GraphError> {
        self.data(data)?;
        Ok(Connection {
            data,
            source: self.producer(data),
            destinations: self.consumers(data),
        })
    }

    /// Connection of the data node feeding `port`.
    pub fn in_connection(&self, port: InPort) -> Result<Connection, GraphError> {
        self.connection(self.input(port)?)
    }

    /// Remove the edge feeding `port`. The data node and its other consumers
    /// are untouched. Returns the data node that was connected, if any.
    pub fn disconnect(&mut self, port: InPort) -> Result<Option<NodeId>, GraphError> {
        self.op(port.node)?;
        Ok(self
            .in_edge_at(port.node, port.idx)
            .and_then(|e| self.detach_edge(e))
            .map(|edge| edge.src))
    }

    /// Detach the data node produced at `port` from its producer. Rejected if
    /// the data node would be left with consumers and no producer.
    pub fn disconnect_source(&mut self, port: OutPort) -> Result<Option<NodeId>, GraphError> {
        self.op(port.node)?;
        match self.out_edge_at(port.node, port.idx) {
            Some(e) => Ok(Some(self.remove_edge(e)?.dst)),
            None => Ok(None),
        }
    }

    /// Feed `dst` from the data node produced at `src`, creating that data node
    /// first when the output port is not connected yet. Returns the data node.
    pub fn connect(&mut self, src: OutPort, dst: InPort) -> Result<NodeId, GraphError> {
        self.expect_kind(src.node, NodeKind::Op)?;
        self.expect_kind(dst.node, NodeKind::Op)?;
        if self.in_edge_at(dst.node, dst.idx).is_some() {
            return Err(GraphError::PortInUse {
                node: dst.node,
                port: dst.idx,
            });
        }

        if let Some(data) = self.out_data(src) {
            self.connect_data(data, dst)?;
            return Ok(data);
        }

        // A fresh data node closes a cycle exactly when the producer is
        // reachable from the consumer.
        if src.node == dst.node || self.reaches(dst.node, src.node) {
            return Err(GraphError::Cycle {
                from: src.node,
                to: dst.node,
            });
        }

        let name = self.unique_name(&format!("{}_out{}", self.node(src.node)?.name, src.idx + 1));
        let data = self.add_data(name, DataNode::default());
        self.insert_edge(Edge {
            src: src.node,
            src_port: src.idx,
            dst: data,
            dst_port: 0,
        });
        self.insert_edge(Edge {
            src: data,
            src_port: 0,
            dst: dst.node,
            dst_port: dst.idx,
        });
        Ok(data)
    }

    /// Feed `dst` from an existing data node.
    pub fn connect_data(&mut self, data: NodeId, dst: InPort) -> Result<(), GraphError> {
        self.expect_kind(data, NodeKind::Data)?;
        self.add_edge(data, 0, dst.node, dst.idx)?;
        Ok(())
    }

    /// Make `data` the output of `src`.
    pub fn connect_output(&mut self, src: OutPort, data: NodeId) -> Result<(), GraphError> {
        self.expect_kind(src.node, NodeKind::Op)?;
        self.add_edge(src.node, src.idx, data, 0)?;
        Ok(())
    }

    /// Move the consumer edge at `from` to `to`, keeping every other consumer of
    /// the data node in place. `to` must be free.
    pub fn set_destination(&mut self, from: InPort, to: InPort) -> Result<(), GraphError> {
        let old = self
            .in_edge_at(from.node, from.idx)
            .ok_or(GraphError::PortNotConnected {
                node: from.node,
                port: from.idx,
            })?;
        let data = self.edge(old).map(|edge| edge.src).ok_or(GraphError::PortNotConnected {
            node: from.node,
            port: from.idx,
        })?;

        if from == to {
            return Ok(());
        }

        // Removing `data -> from` cannot create a path into `data`, so checking
        // the new edge against the current graph is exact.
        let edge = self.check_edge(data, 0, to.node, to.idx)?;
        self.detach_edge(old);
        self.insert_edge(edge);
        Ok(())
    }

    /// Rewire every consumer of `from` to read `to` instead.
    pub fn move_consumers(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.expect_kind(from, NodeKind::Data)?;
        self.expect_kind(to, NodeKind::Data)?;
        if from == to {
            return Ok(());
        }

        let consumers = self.consumers(from);
        for port in &consumers {
            if port.node == to || self.reaches(port.node, to) {
                return Err(GraphError::Cycle {
                    from: to,
                    to: port.node,
                });
            }
        }

        for port in consumers {
            if let Some(e) = self.in_edge_at(port.node, port.idx) {
                self.detach_edge(e);
            }
            self.insert_edge(Edge {
                src: to,
                src_port: 0,
                dst: port.node,
                dst_port: port.idx,
            });
        }
        Ok(())
    }

    fn expect_kind(&self, id: NodeId, expected: NodeKind) -> Result<(), GraphError> {
        let actual = self.node(id)?.kind();
        if actual == expected {
            Ok(())
        } else {
            Err(GraphError::KindMismatch {
                node: id,
                expected,
                actual,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operation;

    /// param -> x -> (a, b)
    fn fan_out() -> (Graph, NodeId, NodeId, NodeId, NodeId) {
        let mut graph = Graph::new();
        let param = graph.add_op("param", Operation::Parameter);
        let x = graph.add_data("x", DataNode::with_shape(vec![2, 2]));
        let a = graph.add_op("a", Operation::Custom("Relu".to_string()));
        let b = graph.add_op("b", Operation::Custom("Relu".to_string()));
        graph.connect_output(param.out_port(0), x).unwrap();
        graph.connect_data(x, a.in_port(0)).unwrap();
        graph.connect_data(x, b.in_port(0)).unwrap();
        (graph, param, x, a, b)
    }

    #[test]
    fn test_source_and_connection() {
        let (graph, param, x, a, b) = fan_out();
        assert_eq!(graph.source(a.in_port(0)), Some(param.out_port(0)));
        let connection = graph.in_connection(b.in_port(0)).unwrap();
        assert_eq!(connection.data, x);
        assert_eq!(connection.source, Some(param.out_port(0)));
        assert_eq!(connection.destinations, vec![a.in_port(0), b.in_port(0)]);
    }

    #[test]
    fn test_disconnect_keeps_other_consumers() {
        let (mut graph, _, x, a, b) = fan_out();
        assert_eq!(graph.disconnect(a.in_port(0)).unwrap(), Some(x));
        assert_eq!(graph.consumers(x), vec![b.in_port(0)]);
        assert_eq!(graph.disconnect(a.in_port(0)).unwrap(), None);
    }

    #[test]
    fn test_set_destination_preserves_other_consumers() {
        let (mut graph, _, x, a, b) = fan_out();
        let c = graph.add_op("c", Operation::Custom("Relu".to_string()));
        graph.set_destination(a.in_port(0), c.in_port(0)).unwrap();
        assert_eq!(graph.consumers(x), vec![b.in_port(0), c.in_port(0)]);
        assert_eq!(graph.in_data(a.in_port(0)), None);
    }

    #[test]
    fn test_set_destination_to_occupied_port_fails() {
        let (mut graph, _, _, a, b) = fan_out();
        let result = graph.set_destination(a.in_port(0), b.in_port(0));
        assert_eq!(
            result,
            Err(GraphError::PortInUse {
                node: b,
                port: 0
            })
        );
        // Nothing moved
        assert!(graph.in_data(a.in_port(0)).is_some());
    }

    #[test]
    fn test_connect_creates_data_node() {
        let (mut graph, _, _, a, b) = fan_out();
        let data = graph.connect(a.out_port(0), b.in_port(1)).unwrap();
        assert_eq!(graph.node(data).unwrap().name, "a_out1");
        assert_eq!(graph.producer(data), Some(a.out_port(0)));
        assert_eq!(graph.consumers(data), vec![b.in_port(1)]);
    }

    #[test]
    fn test_connect_rejects_cycle() {
        let (mut graph, _, _, a, b) = fan_out();
        graph.connect(a.out_port(0), b.in_port(1)).unwrap();
        let result = graph.connect(b.out_port(0), a.in_port(1));
        assert_eq!(result, Err(GraphError::Cycle { from: b, to: a }));
        graph.validate().unwrap();
    }

    #[test]
    fn test_disconnect_source_of_consumed_data_is_fatal() {
        let (mut graph, param, x, _, _) = fan_out();
        assert_eq!(
            graph.disconnect_source(param.out_port(0)),
            Err(GraphError::DanglingData(x))
        );
        assert_eq!(graph.producer(x), Some(param.out_port(0)));
    }

    #[test]
    fn test_move_consumers() {
        let (mut graph, _, x, a, b) = fan_out();
        let y = graph.add_data("y", DataNode::default());
        graph.move_consumers(x, y).unwrap();
        assert!(graph.consumers(x).is_empty());
        assert_eq!(graph.consumers(y), vec![a.in_port(0), b.in_port(0)]);
    }
}
