use std::sync::Arc;

use super::frame::ExecutionFrame;
use super::state::ExecutionStep;
use crate::error::{Result, RuntimeError};
use crate::kernel::OpKernelContext;
use crate::tensor::{Shape, Tensor};

/// Runs the plan one node at a time in topological order on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialExecutor;

impl SequentialExecutor {
    /// Executes every step. The first failure aborts the run and carries the node's identity.
    pub fn execute(&self, frame: &mut ExecutionFrame<'_>) -> Result<()> {
        let state = frame.state();
        for step in state.plan() {
            tracing::trace!(
                node = %step.node_name,
                op = %step.op_type,
                provider = step.provider.provider_type(),
                "executing node"
            );
            execute_step(step, frame).map_err(|err| err.in_node(&step.node_name, &step.op_type))?;
        }
        Ok(())
    }
}

fn execute_step(step: &ExecutionStep, frame: &mut ExecutionFrame<'_>) -> Result<()> {
    let inputs = step
        .input_slots
        .iter()
        .map(|slot| slot.map(|slot| frame.input(slot)).transpose())
        .collect::<Result<Vec<Option<Arc<Tensor>>>>>()?;
    validate_inputs(step, &inputs)?;

    let mut ctx = OpKernelContext::new(step.provider.as_ref(), inputs, step.output_specs.clone());
    step.kernel.compute(&mut ctx)?;

    for (index, produced) in ctx.into_outputs().into_iter().enumerate() {
        let tensor = produced.ok_or_else(|| {
            RuntimeError::usage(format!("kernel did not produce output {index}"))
        })?;
        if let Some(declared) = step.info.output_type(index) {
            declared.check(&tensor, &format!("output {index}"))?;
        }
        frame.commit_output(step.output_slots[index], tensor, step.node_id);
    }
    frame.node_finished(step);
    Ok(())
}

fn validate_inputs(step: &ExecutionStep, inputs: &[Option<Arc<Tensor>>]) -> Result<()> {
    for (index, input) in inputs.iter().enumerate() {
        if let (Some(tensor), Some(declared)) = (input, step.info.input_type(index)) {
            declared.check(tensor, &format!("input {index}"))?;
        }
    }
    if step.broadcast_inputs {
        let mut shape = Shape::scalar();
        for tensor in inputs.iter().flatten() {
            shape = shape.broadcast_with(tensor.shape())?;
        }
    }
    Ok(())
}
