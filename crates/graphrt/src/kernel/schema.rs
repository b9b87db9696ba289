use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use super::memcpy::{MEMCPY_FROM_HOST, MEMCPY_TO_HOST};
use crate::error::{Result, RuntimeError};
use crate::graph::Node;

/// Declared input/output arity of an operator. `None` as a maximum means variadic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpSchema {
    pub op_type: String,
    pub min_inputs: usize,
    pub max_inputs: Option<usize>,
    pub min_outputs: usize,
    pub max_outputs: Option<usize>,
}

impl OpSchema {
    /// Fixed arity.
    pub fn new(op_type: impl Into<String>, inputs: usize, outputs: usize) -> Self {
        Self {
            op_type: op_type.into(),
            min_inputs: inputs,
            max_inputs: Some(inputs),
            min_outputs: outputs,
            max_outputs: Some(outputs),
        }
    }

    pub fn with_inputs(mut self, min: usize, max: Option<usize>) -> Self {
        self.min_inputs = min;
        self.max_inputs = max;
        self
    }

    /// Rejects nodes whose argument counts fall outside the declared signature.
    pub fn check_arity(&self, node: &Node) -> Result<()> {
        let within = |count: usize, min: usize, max: Option<usize>| {
            count >= min && max.map_or(true, |max| count <= max)
        };
        if !within(node.inputs().len(), self.min_inputs, self.max_inputs) {
            return Err(RuntimeError::invalid_graph(format!(
                "node '{}' ({}) has {} inputs, expected {}",
                node.name(),
                self.op_type,
                node.inputs().len(),
                describe(self.min_inputs, self.max_inputs)
            )));
        }
        if !within(node.outputs().len(), self.min_outputs, self.max_outputs) {
            return Err(RuntimeError::invalid_graph(format!(
                "node '{}' ({}) has {} outputs, expected {}",
                node.name(),
                self.op_type,
                node.outputs().len(),
                describe(self.min_outputs, self.max_outputs)
            )));
        }
        Ok(())
    }
}

fn describe(min: usize, max: Option<usize>) -> String {
    match max {
        Some(max) if max == min => format!("{min}"),
        Some(max) => format!("{min}..={max}"),
        None => format!("at least {min}"),
    }
}

/// Operator signatures known to graph validation.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, OpSchema>,
}

static BUILTIN_SCHEMAS: Lazy<SchemaRegistry> = Lazy::new(|| {
    let mut registry = SchemaRegistry::default();
    registry.register(OpSchema::new("Gemm", 3, 1).with_inputs(2, Some(3)));
    for op in ["Add", "Sub", "Mul", "Div"] {
        registry.register(OpSchema::new(op, 2, 1));
    }
    registry.register(OpSchema::new("Sum", 1, 1).with_inputs(1, None));
    for op in ["Reciprocal", "Relu", "Sigmoid", "Tanh", "Identity", "Clip", "Slice"] {
        registry.register(OpSchema::new(op, 1, 1));
    }
    registry.register(OpSchema::new(MEMCPY_FROM_HOST, 1, 1));
    registry.register(OpSchema::new(MEMCPY_TO_HOST, 1, 1));
    registry
});

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signatures of every operator the engine ships kernels for, plus the copy operators.
    pub fn builtin() -> &'static SchemaRegistry {
        &BUILTIN_SCHEMAS
    }

    /// Adds or replaces a schema.
    pub fn register(&mut self, schema: OpSchema) {
        self.schemas.insert(schema.op_type.clone(), schema);
    }

    pub fn get(&self, op_type: &str) -> Option<&OpSchema> {
        self.schemas.get(op_type)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
