//! Execution engine for pre-compiled numerical computation graphs.
//!
//! A graph is loaded once, rewritten by a transformer pipeline, partitioned across execution
//! providers, bound to provider kernels, and then run many times through per-run execution
//! frames.

pub mod alloc;
mod env;
pub mod error;
pub mod graph;
pub mod kernel;
pub mod provider;
pub mod session;
pub mod tensor;
pub mod transform;

pub use alloc::{AllocatorMap, AllocatorPtr, ArenaAllocator, Device, MemKind, MemoryInfo};
pub use error::{ErrorCategory, Result, RuntimeError};
pub use graph::{Graph, Node, NodeId, TypeInfo};
pub use kernel::{KernelDef, KernelRegistry, OpKernel, OpKernelContext, OpKernelInfo};
pub use provider::{ExecutionProvider, ExecutionProviders, ProviderPtr};
pub use session::{ExecutionFrame, InferenceSession, SessionOptions};
pub use tensor::{DType, Shape, Tensor, Value};
