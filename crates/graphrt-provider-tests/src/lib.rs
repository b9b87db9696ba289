pub mod conformance;

/// Instantiates the provider conformance suite for a provider constructor.
///
/// The constructor is called once per test and must return a fresh
/// [`graphrt::ProviderPtr`]. Two providers built by the same constructor are expected to share
/// one kernel registry.
#[macro_export]
macro_rules! define_provider_tests {
    ($module:ident, $provider_ctor:expr) => {
        #[cfg(test)]
        mod $module {
            use $crate::conformance;

            #[test]
            fn default_allocator_is_registered() {
                let provider = ($provider_ctor)();
                conformance::default_allocator_is_registered(&provider);
            }

            #[test]
            fn copy_round_trips_through_device_memory() {
                let provider = ($provider_ctor)();
                conformance::copy_round_trips_through_device_memory(&provider);
            }

            #[test]
            fn copy_rejects_mismatched_destination() {
                let provider = ($provider_ctor)();
                conformance::copy_rejects_mismatched_destination(&provider);
            }

            #[test]
            fn queue_zero_is_always_valid() {
                let provider = ($provider_ctor)();
                conformance::queue_zero_is_always_valid(&provider);
            }

            #[test]
            fn out_of_range_queue_is_rejected() {
                let provider = ($provider_ctor)();
                conformance::out_of_range_queue_is_rejected(&provider);
            }

            #[test]
            fn run_hooks_and_sync_succeed() {
                let provider = ($provider_ctor)();
                conformance::run_hooks_and_sync_succeed(&provider);
            }

            #[test]
            fn kernel_registry_is_shared_per_provider_type() {
                let first = ($provider_ctor)();
                let second = ($provider_ctor)();
                conformance::kernel_registry_is_shared(&first, &second);
            }

            #[test]
            fn device_providers_register_memcpy_kernels() {
                let provider = ($provider_ctor)();
                conformance::device_providers_register_memcpy_kernels(&provider);
            }

            #[test]
            fn identity_graph_runs_end_to_end() {
                let provider = ($provider_ctor)();
                conformance::identity_graph_runs_end_to_end(provider);
            }
        }
    };
}
