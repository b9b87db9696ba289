use std::sync::Arc;

use super::{GraphTransformer, TransformResult};
use crate::error::{Result, RuntimeError};
use crate::graph::Graph;
use crate::kernel::SchemaRegistry;

pub enum Step {
    Pass(Arc<dyn GraphTransformer>),
    FixedPoint { max_iters: usize, steps: Vec<Step> },
}

#[derive(Default)]
pub struct PipelineBuilder {
    steps: Vec<Step>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    pub fn pass(&mut self, pass: Arc<dyn GraphTransformer>) {
        self.steps.push(Step::Pass(pass));
    }

    pub fn fixed_point<F>(&mut self, max_iters: usize, build: F)
    where
        F: FnOnce(&mut PipelineBuilder),
    {
        let mut inner = PipelineBuilder::new();
        build(&mut inner);
        self.steps.push(Step::FixedPoint {
            max_iters: max_iters.max(1),
            steps: inner.steps,
        });
    }

    pub fn finish(self) -> Vec<Step> {
        self.steps
    }
}

/// Terminal state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// The last sweep modified nothing.
    Stable,
    /// Every allowed sweep modified the graph.
    SweepBoundReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    pub state: PipelineState,
    pub sweeps: usize,
    pub result: TransformResult,
}

/// Ordered transformer steps swept over a graph until stable or out of sweeps.
///
/// After every pass that reports a modification the graph is resolved again, so later passes
/// always see a validated graph with a current topological order.
pub struct TransformerPipeline {
    steps: Vec<Step>,
    max_sweeps: usize,
    dump_ir: bool,
}

impl TransformerPipeline {
    pub fn new(steps: Vec<Step>, max_sweeps: usize) -> Self {
        Self {
            steps,
            max_sweeps: max_sweeps.max(1),
            dump_ir: crate::env::dump_ir_enabled(),
        }
    }

    /// Logs a JSON snapshot after every modifying pass.
    pub fn with_dump_ir(mut self, enabled: bool) -> Self {
        self.dump_ir |= enabled;
        self
    }

    pub fn max_sweeps(&self) -> usize {
        self.max_sweeps
    }

    pub fn run(&self, graph: &mut Graph, schemas: &SchemaRegistry) -> Result<PipelineReport> {
        if !graph.is_resolved() {
            graph.resolve(schemas)?;
        }

        let mut totals = TransformResult::default();
        let mut sweeps = 0usize;
        let mut state = PipelineState::SweepBoundReached;
        while sweeps < self.max_sweeps {
            sweeps += 1;
            let changed = self.run_steps(&self.steps, graph, schemas, &mut totals)?;
            tracing::debug!(graph = graph.name(), sweep = sweeps, changed, "transformer sweep");
            if !changed {
                state = PipelineState::Stable;
                break;
            }
        }

        if state == PipelineState::SweepBoundReached {
            tracing::warn!(
                graph = graph.name(),
                sweeps,
                "transformer pipeline hit its sweep bound before stabilising"
            );
        }
        Ok(PipelineReport {
            state,
            sweeps,
            result: totals,
        })
    }

    fn run_steps(
        &self,
        steps: &[Step],
        graph: &mut Graph,
        schemas: &SchemaRegistry,
        totals: &mut TransformResult,
    ) -> Result<bool> {
        let mut changed_any = false;
        for step in steps {
            match step {
                Step::Pass(pass) => {
                    let stats = pass.apply(graph)?;
                    *totals = totals.merge(stats);
                    tracing::debug!(
                        pass = pass.name(),
                        modified = stats.modified,
                        rewrites = stats.rewrites_applied,
                        removed = stats.nodes_removed,
                        inserted = stats.nodes_inserted,
                        "transformer finished"
                    );
                    if stats.modified {
                        changed_any = true;
                        graph.resolve(schemas).map_err(|err| match err {
                            RuntimeError::InvalidGraph(message) => RuntimeError::InvalidGraph(
                                format!("after pass {}: {message}", pass.name()),
                            ),
                            other => other,
                        })?;
                        if self.dump_ir {
                            dump_graph(pass.name(), graph)?;
                        }
                    }
                }
                Step::FixedPoint { max_iters, steps } => {
                    let mut iter = 0usize;
                    while iter < *max_iters {
                        iter += 1;
                        let changed = self.run_steps(steps, graph, schemas, totals)?;
                        changed_any |= changed;
                        if !changed {
                            break;
                        }
                    }
                }
            }
        }
        Ok(changed_any)
    }
}

fn dump_graph(pass: &str, graph: &Graph) -> Result<()> {
    let json = graph.snapshot().to_json()?;
    tracing::debug!(pass, graph = graph.name(), ir = %json, "graph after pass");
    Ok(())
}
