use std::sync::Arc;

use super::registry::{KernelCreateInfo, KernelRegistry};
use crate::error::{Result, RuntimeError};
use crate::graph::{Graph, Node};
use crate::provider::ExecutionProviders;

/// Session-scoped view over the kernel registries of every attached provider.
///
/// Registries are kept in provider priority order. Each entry is a shared handle to the
/// provider's own registry, never a copy.
#[derive(Debug, Clone, Default)]
pub struct KernelRegistryManager {
    registries: Vec<(String, Arc<KernelRegistry>)>,
}

impl KernelRegistryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_providers(providers: &ExecutionProviders) -> Self {
        let mut manager = Self::new();
        for provider in providers.iter() {
            manager.register_registry(provider.provider_type(), provider.kernel_registry());
        }
        manager
    }

    /// Appends a registry at the lowest priority. A provider type keeps its first registry.
    pub fn register_registry(&mut self, provider_type: &str, registry: Arc<KernelRegistry>) {
        if self.registry(provider_type).is_none() {
            self.registries.push((provider_type.to_string(), registry));
        }
    }

    pub fn registry(&self, provider_type: &str) -> Option<&Arc<KernelRegistry>> {
        self.registries
            .iter()
            .find(|(ty, _)| ty == provider_type)
            .map(|(_, registry)| registry)
    }

    pub fn provider_types(&self) -> impl Iterator<Item = &str> {
        self.registries.iter().map(|(ty, _)| ty.as_str())
    }

    /// Resolves the kernel for `node`.
    ///
    /// An assigned node is looked up only in its provider's registry. An unassigned node is tried
    /// against each registry in priority order and takes the first match; the returned provider
    /// type is where the node should be placed.
    pub fn search_kernel(
        &self,
        node: &Node,
        graph: &Graph,
    ) -> Result<(String, Arc<KernelCreateInfo>)> {
        if let Some(provider_type) = node.provider() {
            let registry = self.registry(provider_type).ok_or_else(|| {
                RuntimeError::KernelNotFound {
                    node: node.name().to_string(),
                    op_type: node.op_type().to_string(),
                    provider: provider_type.to_string(),
                    detail: "provider has no kernel registry in this session".to_string(),
                }
            })?;
            let info = registry.find_kernel(node, provider_type, graph)?;
            return Ok((provider_type.to_string(), info));
        }

        let mut tried = Vec::new();
        for (provider_type, registry) in &self.registries {
            match registry.find_kernel(node, provider_type, graph) {
                Ok(info) => return Ok((provider_type.clone(), info)),
                Err(err) => tried.push(format!("{provider_type}: {err}")),
            }
        }
        Err(RuntimeError::KernelNotFound {
            node: node.name().to_string(),
            op_type: node.op_type().to_string(),
            provider: "<unassigned>".to_string(),
            detail: if tried.is_empty() {
                "no providers registered".to_string()
            } else {
                tried.join("; ")
            },
        })
    }
}
