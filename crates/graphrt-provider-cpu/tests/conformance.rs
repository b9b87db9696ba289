use std::sync::Arc;

use graphrt::ProviderPtr;
use graphrt_provider_cpu::CpuExecutionProvider;

fn cpu_provider() -> ProviderPtr {
    Arc::new(CpuExecutionProvider::new().expect("cpu provider"))
}

graphrt_provider_tests::define_provider_tests!(cpu, super::cpu_provider);
