use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::def::{ArgSelector, KernelDef};
use super::info::OpKernelInfo;
use super::OpKernel;
use crate::error::{Result, RuntimeError};
use crate::graph::{Graph, Node};
use crate::tensor::DType;

/// Factory building a kernel instance for one node.
pub type KernelCreateFn = fn(&OpKernelInfo) -> Result<Box<dyn OpKernel>>;

/// A registry entry: metadata plus factory.
pub struct KernelCreateInfo {
    pub def: KernelDef,
    pub create: KernelCreateFn,
}

impl fmt::Debug for KernelCreateInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelCreateInfo")
            .field("def", &self.def)
            .finish_non_exhaustive()
    }
}

/// Catalog of kernels keyed by operator and provider type.
///
/// Built once per provider type, then frozen behind an `Arc` and shared by every session using
/// that provider. Conflicting registrations are rejected up front so lookups never have to
/// break ties.
#[derive(Debug, Default)]
pub struct KernelRegistry {
    entries: BTreeMap<(String, String), Vec<Arc<KernelCreateInfo>>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a kernel.
    ///
    /// Fails with `DuplicateKernel` when an entry with the same operator, provider, opset range
    /// and type constraints exists, and with `AmbiguousKernel` when an overlapping entry is
    /// equally specific.
    pub fn register(&mut self, def: KernelDef, create: KernelCreateFn) -> Result<()> {
        let key = (def.op_type().to_string(), def.provider_type().to_string());
        let bucket = self.entries.entry(key).or_default();
        for existing in bucket.iter() {
            if existing.def.same_key(&def) {
                return Err(RuntimeError::DuplicateKernel(def.to_string()));
            }
            let (a_in, a_out) = existing.def.explicit_arity();
            let (b_in, b_out) = def.explicit_arity();
            let (inputs, outputs) = (a_in.max(b_in), a_out.max(b_out));
            if existing.def.overlaps(&def)
                && existing.def.constraint_width(inputs, outputs)
                    == def.constraint_width(inputs, outputs)
            {
                return Err(RuntimeError::AmbiguousKernel(format!(
                    "{def} overlaps {} with equal specificity",
                    existing.def
                )));
            }
        }
        bucket.push(Arc::new(KernelCreateInfo { def, create }));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn kernel_defs(&self) -> impl Iterator<Item = &KernelDef> {
        self.entries.values().flatten().map(|info| &info.def)
    }

    pub fn has_op(&self, op_type: &str, provider_type: &str) -> bool {
        self.entries
            .contains_key(&(op_type.to_string(), provider_type.to_string()))
    }

    /// Finds the most specific kernel for `node` on `provider_type`.
    pub fn find_kernel(
        &self,
        node: &Node,
        provider_type: &str,
        graph: &Graph,
    ) -> Result<Arc<KernelCreateInfo>> {
        let not_found = |detail: String| RuntimeError::KernelNotFound {
            node: node.name().to_string(),
            op_type: node.op_type().to_string(),
            provider: provider_type.to_string(),
            detail,
        };

        let key = (node.op_type().to_string(), provider_type.to_string());
        let candidates = self
            .entries
            .get(&key)
            .ok_or_else(|| not_found("operator not registered".to_string()))?;

        let in_range: Vec<&Arc<KernelCreateInfo>> = candidates
            .iter()
            .filter(|info| info.def.versions().contains(node.version()))
            .collect();
        if in_range.is_empty() {
            return Err(not_found(format!(
                "no kernel covers opset version {}",
                node.version()
            )));
        }

        let (inputs, outputs) = (node.inputs().len(), node.outputs().len());
        let mut failure = String::new();
        let mut best: Option<(usize, &Arc<KernelCreateInfo>)> = None;
        for info in in_range {
            match type_mismatch(&info.def, node, graph) {
                Some(reason) => failure = reason,
                None => {
                    let width = info.def.constraint_width(inputs, outputs);
                    if best.map_or(true, |(best_width, _)| width < best_width) {
                        best = Some((width, info));
                    }
                }
            }
        }
        best.map(|(_, info)| Arc::clone(info)).ok_or_else(|| not_found(failure))
    }
}

/// Describes the first type constraint `node` violates under `def`, if any.
fn type_mismatch(def: &KernelDef, node: &Node, graph: &Graph) -> Option<String> {
    let arg_type = |name: &str| -> Option<DType> {
        if name.is_empty() {
            return None;
        }
        graph.value_type(name).map(|info| info.dtype)
    };

    for constraint in def.type_constraints() {
        for selector in &constraint.args {
            let names: Vec<&String> = match *selector {
                ArgSelector::Input(index) => node.inputs().get(index).into_iter().collect(),
                ArgSelector::Output(index) => node.outputs().get(index).into_iter().collect(),
                ArgSelector::AllInputs => node.inputs().iter().collect(),
                ArgSelector::AllOutputs => node.outputs().iter().collect(),
            };
            for name in names {
                if name.is_empty() {
                    continue;
                }
                match arg_type(name) {
                    Some(dtype) if constraint.allows(dtype) => {}
                    Some(dtype) => {
                        return Some(format!(
                            "'{name}' is {dtype}, constraint {} allows {:?}",
                            constraint.name,
                            constraint.allowed.as_slice()
                        ))
                    }
                    None => return Some(format!("'{name}' has no declared type")),
                }
            }
        }
    }
    None
}
