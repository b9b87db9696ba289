use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;

use crate::alloc::MemKind;
use crate::tensor::DType;

/// Inclusive opset range a kernel serves. `end == None` means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VersionRange {
    pub start: u32,
    pub end: Option<u32>,
}

impl VersionRange {
    pub fn since(start: u32) -> Self {
        Self { start, end: None }
    }

    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    pub fn contains(&self, version: u32) -> bool {
        version >= self.start && self.end.map_or(true, |end| version <= end)
    }

    pub fn overlaps(&self, other: &VersionRange) -> bool {
        let self_end = self.end.unwrap_or(u32::MAX);
        let other_end = other.end.unwrap_or(u32::MAX);
        self.start <= other_end && other.start <= self_end
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {end}]", self.start),
            None => write!(f, "[{}, ..)", self.start),
        }
    }
}

/// Which node arguments a type constraint applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgSelector {
    Input(usize),
    Output(usize),
    AllInputs,
    AllOutputs,
}

impl ArgSelector {
    fn may_alias(self, other: ArgSelector) -> bool {
        use ArgSelector::*;
        match (self, other) {
            (Input(a), Input(b)) | (Output(a), Output(b)) => a == b,
            (AllInputs, Input(_)) | (Input(_), AllInputs) | (AllInputs, AllInputs) => true,
            (AllOutputs, Output(_)) | (Output(_), AllOutputs) | (AllOutputs, AllOutputs) => true,
            _ => false,
        }
    }
}

/// Named set of dtypes the selected arguments may carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeConstraint {
    pub name: String,
    pub allowed: SmallVec<[DType; 4]>,
    pub args: SmallVec<[ArgSelector; 4]>,
}

impl TypeConstraint {
    pub fn allows(&self, dtype: DType) -> bool {
        self.allowed.contains(&dtype)
    }

    /// True when some dtype satisfies both constraints on a shared argument, or they share none.
    fn compatible_with(&self, other: &TypeConstraint) -> bool {
        let shares_arg = self
            .args
            .iter()
            .any(|a| other.args.iter().any(|b| a.may_alias(*b)));
        !shares_arg || self.allowed.iter().any(|dtype| other.allows(*dtype))
    }
}

/// Kernel metadata: what it implements, for whom, and what memory it expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelDef {
    op_type: String,
    provider_type: String,
    versions: VersionRange,
    constraints: Vec<TypeConstraint>,
    input_mem: BTreeMap<usize, MemKind>,
    output_mem: BTreeMap<usize, MemKind>,
    broadcast_inputs: bool,
}

impl KernelDef {
    pub fn builder(op_type: impl Into<String>, provider_type: impl Into<String>) -> KernelDefBuilder {
        KernelDefBuilder {
            def: KernelDef {
                op_type: op_type.into(),
                provider_type: provider_type.into(),
                versions: VersionRange::since(1),
                constraints: Vec::new(),
                input_mem: BTreeMap::new(),
                output_mem: BTreeMap::new(),
                broadcast_inputs: false,
            },
        }
    }

    pub fn op_type(&self) -> &str {
        &self.op_type
    }

    pub fn provider_type(&self) -> &str {
        &self.provider_type
    }

    pub fn versions(&self) -> VersionRange {
        self.versions
    }

    pub fn type_constraints(&self) -> &[TypeConstraint] {
        &self.constraints
    }

    /// Memory kind the kernel reads input `index` from.
    pub fn input_mem_kind(&self, index: usize) -> MemKind {
        self.input_mem
            .get(&index)
            .copied()
            .unwrap_or(MemKind::Default)
    }

    /// Memory kind the kernel writes output `index` to.
    pub fn output_mem_kind(&self, index: usize) -> MemKind {
        self.output_mem
            .get(&index)
            .copied()
            .unwrap_or(MemKind::Default)
    }

    pub fn broadcast_inputs(&self) -> bool {
        self.broadcast_inputs
    }

    /// Summed per-argument dtype width for a node with `inputs` inputs and `outputs` outputs.
    /// Smaller is more specific.
    ///
    /// An argument no constraint selects counts as every dtype; a constrained argument counts as
    /// the intersection of the sets that select it.
    pub fn constraint_width(&self, inputs: usize, outputs: usize) -> usize {
        let inputs = (0..inputs).map(ArgSelector::Input);
        let outputs = (0..outputs).map(ArgSelector::Output);
        inputs.chain(outputs).map(|arg| self.arg_width(arg)).sum()
    }

    fn arg_width(&self, arg: ArgSelector) -> usize {
        DType::ALL
            .iter()
            .filter(|dtype| {
                self.constraints
                    .iter()
                    .filter(|c| c.args.iter().any(|selected| selected.may_alias(arg)))
                    .all(|c| c.allows(**dtype))
            })
            .count()
    }

    /// Smallest input/output counts covering every index the def constrains explicitly.
    pub(crate) fn explicit_arity(&self) -> (usize, usize) {
        let mut arity = (1, 1);
        for selector in self.constraints.iter().flat_map(|c| c.args.iter()) {
            match *selector {
                ArgSelector::Input(index) => arity.0 = arity.0.max(index + 1),
                ArgSelector::Output(index) => arity.1 = arity.1.max(index + 1),
                ArgSelector::AllInputs | ArgSelector::AllOutputs => {}
            }
        }
        arity
    }

    /// True when the two defs could both match one node.
    pub fn overlaps(&self, other: &KernelDef) -> bool {
        self.op_type == other.op_type
            && self.provider_type == other.provider_type
            && self.versions.overlaps(&other.versions)
            && self
                .constraints
                .iter()
                .all(|a| other.constraints.iter().all(|b| a.compatible_with(b)))
    }

    /// Registration identity: everything that decides whether the kernel matches a node.
    pub(crate) fn same_key(&self, other: &KernelDef) -> bool {
        self.op_type == other.op_type
            && self.provider_type == other.provider_type
            && self.versions == other.versions
            && self.constraints == other.constraints
    }
}

impl fmt::Display for KernelDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} {}", self.op_type, self.provider_type, self.versions)?;
        for constraint in &self.constraints {
            write!(f, " {}={:?}", constraint.name, constraint.allowed.as_slice())?;
        }
        Ok(())
    }
}

pub struct KernelDefBuilder {
    def: KernelDef,
}

impl KernelDefBuilder {
    pub fn since_version(mut self, start: u32) -> Self {
        self.def.versions = VersionRange::since(start);
        self
    }

    pub fn version_range(mut self, start: u32, end: u32) -> Self {
        self.def.versions = VersionRange::new(start, end);
        self
    }

    pub fn type_constraint(
        mut self,
        name: impl Into<String>,
        allowed: impl IntoIterator<Item = DType>,
        args: impl IntoIterator<Item = ArgSelector>,
    ) -> Self {
        let mut allowed: SmallVec<[DType; 4]> = allowed.into_iter().collect();
        allowed.sort();
        allowed.dedup();
        self.def.constraints.push(TypeConstraint {
            name: name.into(),
            allowed,
            args: args.into_iter().collect(),
        });
        self
    }

    pub fn input_memory(mut self, index: usize, mem_kind: MemKind) -> Self {
        self.def.input_mem.insert(index, mem_kind);
        self
    }

    pub fn output_memory(mut self, index: usize, mem_kind: MemKind) -> Self {
        self.def.output_mem.insert(index, mem_kind);
        self
    }

    /// Requests multidirectional broadcast validation of all inputs before compute.
    pub fn broadcast_inputs(mut self) -> Self {
        self.def.broadcast_inputs = true;
        self
    }

    pub fn build(self) -> KernelDef {
        self.def
    }
}
