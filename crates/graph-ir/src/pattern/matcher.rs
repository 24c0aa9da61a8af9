//! Backtracking subgraph matcher.
//!
//! Roles are bound in declaration order. A role connected to an already bound
//! role only considers that node's neighbours; otherwise every node is a
//! candidate, in topological order. Each required edge is checked as soon as
//! both of its endpoints are bound, so a failing edge prunes the search early.
//! Matching is injective and never mutates the graph.

use std::ops::ControlFlow;

use crate::ir::{Graph, NodeId};

use super::{Match, Pattern, PatternEdge};

/// All matches of `pattern`, in search order.
pub fn find_matches(graph: &Graph, pattern: &Pattern) -> Vec<Match> {
    let mut found = Vec::new();
    let _ = Search::new(graph, pattern).run(&mut |m: Match| {
        found.push(m);
        ControlFlow::<()>::Continue(())
    });
    found
}

/// First match for which `skip` returns `false`.
pub fn find_first(
    graph: &Graph,
    pattern: &Pattern,
    mut skip: impl FnMut(&Match) -> bool,
) -> Option<Match> {
    match Search::new(graph, pattern).run(&mut |m: Match| {
        if skip(&m) {
            ControlFlow::Continue(())
        } else {
            ControlFlow::Break(m)
        }
    }) {
        ControlFlow::Break(m) => Some(m),
        ControlFlow::Continue(()) => None,
    }
}

struct Search<'a> {
    graph: &'a Graph,
    pattern: &'a Pattern,
    bound: Vec<NodeId>,
}

impl<'a> Search<'a> {
    fn new(graph: &'a Graph, pattern: &'a Pattern) -> Self {
        Self {
            graph,
            pattern,
            bound: Vec::with_capacity(pattern.roles().len()),
        }
    }

    fn run<B>(&mut self, visit: &mut dyn FnMut(Match) -> ControlFlow<B>) -> ControlFlow<B> {
        let role = self.bound.len();
        if role == self.pattern.roles().len() {
            let bindings = self
                .pattern
                .roles()
                .iter()
                .zip(&self.bound)
                .map(|(role, &id)| (role.name, id))
                .collect();
            return visit(Match::new(bindings));
        }

        let pattern = self.pattern;
        let predicate = &pattern.roles()[role].predicate;
        for candidate in self.candidates(role) {
            if self.bound.contains(&candidate) {
                continue;
            }
            let Ok(node) = self.graph.node(candidate) else {
                continue;
            };
            if !predicate.matches(node) {
                continue;
            }

            self.bound.push(candidate);
            if self.edges_hold(role) {
                self.run(visit)?;
            }
            self.bound.pop();
        }
        ControlFlow::Continue(())
    }

    /// Neighbours of the first bound role adjacent to `role`, or every node.
    fn candidates(&self, role: usize) -> Vec<NodeId> {
        let anchor = self.pattern.edges().iter().find_map(|edge| {
            if edge.dst == role && edge.src < role {
                Some(self.graph.successors(self.bound[edge.src]))
            } else if edge.src == role && edge.dst < role {
                Some(self.graph.predecessors(self.bound[edge.dst]))
            } else {
                None
            }
        });

        match anchor {
            Some(mut neighbours) => {
                neighbours.sort();
                neighbours.dedup();
                neighbours
            }
            None => self.graph.topological_order().to_vec(),
        }
    }

    /// Check every pattern edge whose later endpoint is `role`.
    fn edges_hold(&self, role: usize) -> bool {
        self.pattern
            .edges()
            .iter()
            .filter(|edge| edge.src.max(edge.dst) == role)
            .all(|edge| self.edge_exists(edge))
    }

    fn edge_exists(&self, edge: &PatternEdge) -> bool {
        let src = self.bound[edge.src];
        let dst = self.bound[edge.dst];
        let src_is_op = self.graph.node(src).is_ok_and(|node| node.is_op());

        self.graph
            .out_edges(src)
            .iter()
            .filter_map(|&e| self.graph.edge(e))
            .any(|graph_edge| {
                let op_port = if src_is_op {
                    graph_edge.src_port
                } else {
                    graph_edge.dst_port
                };
                graph_edge.dst == dst && edge.port.is_none_or(|port| port == op_port)
            })
    }
}
