//! Kernel dispatch: definitions, registries, and the per-node compute contract.

pub mod broadcast;
mod context;
mod def;
mod info;
mod manager;
mod memcpy;
mod registry;
mod schema;

pub use context::{OpKernelContext, OutputSpec};
pub use def::{ArgSelector, KernelDef, KernelDefBuilder, TypeConstraint, VersionRange};
pub use info::OpKernelInfo;
pub use manager::KernelRegistryManager;
pub use memcpy::{
    is_memcpy_op, register_memcpy_kernels, MemcpyKernel, MEMCPY_FROM_HOST, MEMCPY_TO_HOST,
};
pub use registry::{KernelCreateFn, KernelCreateInfo, KernelRegistry};
pub use schema::{OpSchema, SchemaRegistry};

use crate::error::Result;

/// A constructed kernel bound to one node.
pub trait OpKernel: Send + Sync {
    fn compute(&self, ctx: &mut OpKernelContext<'_>) -> Result<()>;
}
