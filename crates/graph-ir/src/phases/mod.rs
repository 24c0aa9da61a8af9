//! Graph-wide analysis passes that run outside the rewrite rules.

mod shape_inference;

pub use shape_inference::infer_shapes;
