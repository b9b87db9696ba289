//! Graph transformer infrastructure and passes.
//!
//! A transformer mutates the graph in place and reports what it did; the pipeline decides when
//! to re-resolve and whether to sweep again.

mod identity_elimination;
mod memcpy;
mod pipeline;
mod rule;
mod slice_elimination;

pub use identity_elimination::EliminateIdentity;
pub use memcpy::MemcpyTransformer;
pub use pipeline::{PipelineBuilder, PipelineReport, PipelineState, Step, TransformerPipeline};
pub use rule::{RewriteEffect, RewriteRule, RuleBasedTransformer};
pub use slice_elimination::EliminateSlice;

use crate::error::Result;
use crate::graph::Graph;

/// Result returned by a [`GraphTransformer`] after it runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransformResult {
    /// Whether the pass changed the graph.
    pub modified: bool,
    /// Rewrites applied, counting each matched rule once.
    pub rewrites_applied: usize,
    pub nodes_removed: usize,
    pub nodes_inserted: usize,
}

impl TransformResult {
    /// Merges two results, accumulating statistics.
    pub fn merge(self, other: TransformResult) -> TransformResult {
        TransformResult {
            modified: self.modified || other.modified,
            rewrites_applied: self.rewrites_applied + other.rewrites_applied,
            nodes_removed: self.nodes_removed + other.nodes_removed,
            nodes_inserted: self.nodes_inserted + other.nodes_inserted,
        }
    }
}

/// A pass over the whole graph.
pub trait GraphTransformer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Rewrites `graph`. The graph is resolved on entry.
    fn apply(&self, graph: &mut Graph) -> Result<TransformResult>;
}
