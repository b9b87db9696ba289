use std::fmt;

use super::def::KernelDef;
use crate::error::{Result, RuntimeError};
use crate::graph::{FromAttribute, Graph, Node, TypeInfo};
use crate::provider::ProviderPtr;

/// Construction-time view a kernel factory receives for its node.
pub struct OpKernelInfo {
    node: Node,
    def: KernelDef,
    provider: ProviderPtr,
    input_types: Vec<Option<TypeInfo>>,
    output_types: Vec<Option<TypeInfo>>,
}

impl OpKernelInfo {
    pub fn new(node: &Node, def: &KernelDef, provider: ProviderPtr, graph: &Graph) -> Self {
        let lookup = |name: &String| {
            if name.is_empty() {
                None
            } else {
                graph.value_type(name).cloned()
            }
        };
        Self {
            node: node.clone(),
            def: def.clone(),
            provider,
            input_types: node.inputs().iter().map(lookup).collect(),
            output_types: node.outputs().iter().map(lookup).collect(),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn node_name(&self) -> &str {
        self.node.name()
    }

    pub fn op_type(&self) -> &str {
        self.node.op_type()
    }

    pub fn kernel_def(&self) -> &KernelDef {
        &self.def
    }

    pub fn provider(&self) -> &ProviderPtr {
        &self.provider
    }

    pub fn input_count(&self) -> usize {
        self.input_types.len()
    }

    pub fn output_count(&self) -> usize {
        self.output_types.len()
    }

    pub fn input_type(&self, index: usize) -> Option<&TypeInfo> {
        self.input_types.get(index).and_then(Option::as_ref)
    }

    pub fn output_type(&self, index: usize) -> Option<&TypeInfo> {
        self.output_types.get(index).and_then(Option::as_ref)
    }

    /// Reads a required attribute.
    pub fn attr<T: FromAttribute>(&self, name: &str) -> Result<T> {
        self.node
            .typed_attribute(name)?
            .ok_or_else(|| RuntimeError::InvalidAttribute {
                name: name.to_string(),
                detail: format!("required by node '{}' ({})", self.node_name(), self.op_type()),
            })
    }

    /// Reads an optional attribute, falling back to `default` when absent.
    pub fn attr_or<T: FromAttribute>(&self, name: &str, default: T) -> Result<T> {
        Ok(self.node.typed_attribute(name)?.unwrap_or(default))
    }
}

impl fmt::Debug for OpKernelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpKernelInfo")
            .field("node", &self.node.name())
            .field("def", &self.def)
            .field("provider", &self.provider.provider_type())
            .finish()
    }
}
