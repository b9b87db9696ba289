use super::{GraphTransformer, TransformResult};
use crate::error::Result;
use crate::graph::{Graph, Node, NodeId};

/// What a rule did to the node it was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteEffect {
    Unchanged,
    Modified,
    NodeRemoved,
}

/// A local rewrite keyed by operator type.
pub trait RewriteRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// Operator the rule is registered for.
    fn op_type(&self) -> &'static str;

    fn satisfy_condition(&self, graph: &Graph, node: &Node) -> bool;

    fn apply(&self, graph: &mut Graph, node: NodeId) -> Result<RewriteEffect>;
}

/// Transformer that walks nodes in topological order and applies matching rules.
pub struct RuleBasedTransformer {
    name: &'static str,
    rules: Vec<Box<dyn RewriteRule>>,
}

impl RuleBasedTransformer {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: impl RewriteRule + 'static) -> Self {
        self.rules.push(Box::new(rule));
        self
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|rule| rule.name())
    }
}

impl GraphTransformer for RuleBasedTransformer {
    fn name(&self) -> &'static str {
        self.name
    }

    fn apply(&self, graph: &mut Graph) -> Result<TransformResult> {
        let order = graph.topological_order()?.to_vec();
        let mut result = TransformResult::default();
        for id in order {
            for rule in &self.rules {
                // An earlier rule may have removed the node.
                let Some(node) = graph.node(id) else {
                    break;
                };
                if node.op_type() != rule.op_type() || !rule.satisfy_condition(graph, node) {
                    continue;
                }
                match rule.apply(graph, id)? {
                    RewriteEffect::Unchanged => {}
                    RewriteEffect::Modified => {
                        result.modified = true;
                        result.rewrites_applied += 1;
                    }
                    RewriteEffect::NodeRemoved => {
                        result.modified = true;
                        result.rewrites_applied += 1;
                        result.nodes_removed += 1;
                    }
                }
            }
        }
        if result.modified {
            tracing::debug!(
                transformer = self.name,
                rewrites = result.rewrites_applied,
                removed = result.nodes_removed,
                "rule-based rewrite applied"
            );
        }
        Ok(result)
    }
}
