//! Graph representation and algorithms module

pub mod model;
pub mod builder;
pub mod algorithms;
pub mod community;
pub mod subgraphs;

pub use builder::{build_graph, BuildDiagnostics, GraphBuilder};
pub use model::{Edge, Node, TransactionGraph};
