//! Handling of whole compilation inputs: reading source files into the
//! [`SourceMap`](crate::compiler::SourceMap), driving the front end over
//! every input unit, and persisting a resolved type graph so that a later
//! run (or a sibling tool) can reuse it without reparsing.

mod graph;
mod input;

pub use graph::{GraphError, GraphFile, GRAPH_FORMAT};
pub use input::{load_sources, parse_sources, FrontError};
