use std::collections::BTreeSet;
use std::sync::Arc;

use super::state::{ExecutionStep, SessionState, SlotKind};
use crate::error::{Result, RuntimeError};
use crate::graph::NodeId;
use crate::tensor::{Tensor, Value};

/// A slot whose buffer went back to its allocator before the frame ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseEvent {
    pub slot: usize,
    pub name: String,
    /// Node whose completion dropped the last reference.
    pub after_node: NodeId,
}

/// A node output committed to its slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationEvent {
    pub slot: usize,
    pub name: String,
    pub node: NodeId,
    pub allocator: String,
    pub bytes: usize,
}

/// Per-run slot table over a [`SessionState`].
///
/// Slots are addressed by index. Each slot tracks how many of its consumers have not run yet;
/// intermediates are dropped the moment that count reaches zero so the owning arena can hand the
/// memory to a later node. Everything still held is released when the frame is dropped, including
/// after a failed run.
pub struct ExecutionFrame<'s> {
    state: &'s SessionState,
    values: Vec<Value>,
    remaining_consumers: Vec<usize>,
    release_early: bool,
    releases: Vec<ReleaseEvent>,
    allocations: Vec<AllocationEvent>,
}

impl<'s> ExecutionFrame<'s> {
    pub fn new(state: &'s SessionState, release_early: bool) -> Self {
        let mut values = vec![Value::Empty; state.slot_count()];
        for (slot, tensor) in state.initializers() {
            values[*slot] = Value::Tensor(Arc::clone(tensor));
        }
        Self {
            state,
            values,
            remaining_consumers: state.slots().iter().map(|slot| slot.consumers).collect(),
            release_early,
            releases: Vec::new(),
            allocations: Vec::new(),
        }
    }

    pub fn state(&self) -> &'s SessionState {
        self.state
    }

    /// Binds a caller-supplied value to a graph input after checking it against the declaration.
    pub fn bind_input(&mut self, name: &str, tensor: impl Into<Arc<Tensor>>) -> Result<()> {
        let slot = self
            .state
            .slot_index(name)
            .filter(|slot| self.state.slot(*slot).kind == SlotKind::Input)
            .ok_or_else(|| RuntimeError::usage(format!("'{name}' is not a graph input")))?;
        let tensor = tensor.into();
        if !tensor.is_allocated() {
            return Err(RuntimeError::usage(format!("input '{name}' has no storage")));
        }
        self.state
            .slot(slot)
            .type_info
            .check(&tensor, &format!("input '{name}'"))?;
        if !self.values[slot].is_empty() {
            return Err(RuntimeError::usage(format!("input '{name}' is bound twice")));
        }
        self.values[slot] = Value::Tensor(tensor);
        Ok(())
    }

    /// Fails with `MissingInput` naming the first unbound graph input.
    pub fn ensure_inputs_bound(&self) -> Result<()> {
        for &slot in self.state.input_slots() {
            if self.values[slot].is_empty() {
                return Err(RuntimeError::MissingInput(self.state.slot(slot).name.clone()));
            }
        }
        Ok(())
    }

    pub(crate) fn input(&self, slot: usize) -> Result<Arc<Tensor>> {
        self.values[slot]
            .as_tensor()
            .cloned()
            .ok_or_else(|| RuntimeError::MissingInput(self.state.slot(slot).name.clone()))
    }

    pub(crate) fn commit_output(&mut self, slot: usize, tensor: Tensor, node: NodeId) {
        let state = self.state;
        let name = &state.slot(slot).name;
        let allocator = tensor
            .location()
            .map(|info| info.name.clone())
            .unwrap_or_default();
        tracing::trace!(slot, name = %name, allocator = %allocator, bytes = tensor.byte_len(), "slot written");
        self.allocations.push(AllocationEvent {
            slot,
            name: name.clone(),
            node,
            allocator,
            bytes: tensor.byte_len(),
        });
        self.values[slot] = Value::from_tensor(tensor);
    }

    /// Drops one reference from each distinct input of `step` and releases what hit zero.
    pub(crate) fn node_finished(&mut self, step: &ExecutionStep) {
        let inputs: BTreeSet<usize> = step.input_slots.iter().flatten().copied().collect();
        for slot in inputs {
            let remaining = &mut self.remaining_consumers[slot];
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.release(slot, step.node_id);
            }
        }
        for &slot in &step.output_slots {
            if self.remaining_consumers[slot] == 0 {
                self.release(slot, step.node_id);
            }
        }
    }

    fn release(&mut self, slot: usize, after_node: NodeId) {
        let state = self.state;
        let info = state.slot(slot);
        if !self.release_early || info.kind != SlotKind::Intermediate {
            return;
        }
        if self.values[slot].take().is_empty() {
            return;
        }
        tracing::trace!(slot, name = %info.name, node = %after_node, "slot released");
        self.releases.push(ReleaseEvent {
            slot,
            name: info.name.clone(),
            after_node,
        });
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.state.slot_index(name).map(|slot| &self.values[slot])
    }

    /// Returns the current value of `name`, failing if it was never produced or already released.
    pub fn fetch(&self, name: &str) -> Result<Arc<Tensor>> {
        let slot = self
            .state
            .slot_index(name)
            .ok_or_else(|| RuntimeError::UnknownOutput(name.to_string()))?;
        self.values[slot].as_tensor().cloned().ok_or_else(|| {
            RuntimeError::usage(format!("'{name}' holds no value in this frame"))
        })
    }

    pub fn is_released(&self, name: &str) -> bool {
        self.releases.iter().any(|event| event.name == name)
    }

    pub fn release_events(&self) -> &[ReleaseEvent] {
        &self.releases
    }

    pub fn allocation_events(&self) -> &[AllocationEvent] {
        &self.allocations
    }
}
