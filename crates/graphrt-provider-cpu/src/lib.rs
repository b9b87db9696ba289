//! Host CPU execution provider.
//!
//! Kernels live in [`kernels`] and add themselves to [`kernels::CPU_KERNEL_REGISTRARS`] at link
//! time; [`register_cpu_kernels`] replays that list into any registry under any provider type, so
//! other host-compute providers can reuse the same numeric code.

pub mod kernels;
mod provider;

pub use kernels::{register_cpu_kernels, KernelRegistrar, CPU_KERNEL_REGISTRARS};
pub use provider::{cpu_kernel_registry, CpuExecutionProvider, CPU_PROVIDER};
