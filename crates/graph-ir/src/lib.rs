//! Graph IR rewrite engine
//!
//! An arena-backed graph of alternating operator and data nodes, a declarative
//! pattern matcher, and a set of rewrite rules that legalize and fuse
//! operators in place.
//!
//! ```
//! use graph_ir::ir::{DataNode, Graph, Operation};
//! use graph_ir::node::PermuteConfig;
//! use graph_ir::rewrite::PassManager;
//!
//! let mut graph = Graph::new();
//! let input = graph.add_op("input", Operation::Parameter);
//! let x = graph.add_data("x", DataNode::with_shape(vec![1, 8, 8, 3]));
//! graph.connect_output(input.out_port(0), x).unwrap();
//!
//! let to_nchw = graph.add_op("to_nchw", Operation::Permute(PermuteConfig::new(vec![0, 3, 1, 2])));
//! graph.connect_data(x, to_nchw.in_port(0)).unwrap();
//! let y = graph.add_data("y", DataNode::default());
//! graph.connect_output(to_nchw.out_port(0), y).unwrap();
//!
//! let to_nhwc = graph.add_op("to_nhwc", Operation::Permute(PermuteConfig::new(vec![0, 2, 3, 1])));
//! graph.connect_data(y, to_nhwc.in_port(0)).unwrap();
//! let z = graph.add_data("z", DataNode::default());
//! graph.connect_output(to_nhwc.out_port(0), z).unwrap();
//!
//! let output = graph.add_op("output", Operation::Output);
//! graph.connect_data(z, output.in_port(0)).unwrap();
//!
//! let passes = PassManager::builder().default_rules().build().unwrap();
//! let report = passes.run(&mut graph).unwrap();
//!
//! assert_eq!(report.get("FusePermutesSequence"), Some(1));
//! assert_eq!(graph.in_data(output.in_port(0)), Some(x));
//! ```

pub mod error;
pub mod ir;
pub mod node;
pub mod pattern;
pub mod permutation;
pub mod phases;
pub mod rewrite;

pub use error::GraphError;
pub use ir::{Graph, NodeId};
pub use permutation::Permutation;
pub use rewrite::{PassManager, PassReport, RewriteRule};
