//! Core IR data structures
//!
//! - `graph` - Arena graph, edges and the cached topological order
//! - `node` - Operator and data node payloads
//! - `port` - Port and connection view over the edge set
//! - `tensor` - Broadcasting and conversion helpers for constant values

mod graph;
mod node;
mod port;
mod tensor;

pub use graph::{Edge, EdgeId, Graph, Layout};
pub use node::{
    AttributeValue, DataNode, Node, NodeId, NodeKind, NodePayload, OpNode, OpType, Operation,
};
pub use port::{Connection, InPort, OutPort};
pub use tensor::{TensorDataExt, broadcast_shapes, broadcast_to, float_tensor, nrmsd};

// Re-exported so callers building constants need no direct burn-tensor import.
pub use burn_tensor::{DType, TensorData};
