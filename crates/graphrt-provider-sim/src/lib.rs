//! An accelerator emulated in host memory.
//!
//! The simulated device has its own address space (allocations are tagged
//! [`Device::Accelerator`](graphrt::Device::Accelerator)), a pinned staging arena for
//! device-to-host transfers, several execution queues, and copies that only complete once
//! [`sync`](graphrt::ExecutionProvider::sync) is called. Numeric kernels are the CPU ones,
//! registered again under this provider's type, so graphs can be split between the two.

mod provider;

pub use provider::{sim_kernel_registry, SimDevice, SimExecutionProvider, SimStats, SIM_PROVIDER};
