//! Graph intermediate representation.
//!
//! Nodes are owned by a single table inside [`Graph`] and refer to each other only through
//! argument names, so a rewrite is always a table edit plus a rename.

pub mod attribute;
#[allow(clippy::module_inception)]
mod graph;
mod node;
mod snapshot;
pub mod utils;

pub use attribute::{AttributeValue, Attributes, FromAttribute};
pub use graph::{Graph, TypeInfo};
pub use node::{Node, NodeId, DEFAULT_OPSET_VERSION};
pub use snapshot::{GraphSnapshot, NodeSnapshot, ValueSnapshot};
