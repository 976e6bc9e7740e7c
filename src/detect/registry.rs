use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::backend::{Capability, ModelBackend};

/// Ordered set of model backends injected into the pipeline.
///
/// Replaces ambient "is the script on the page yet" probing: the pipeline only
/// ever asks the registry which backend currently supports a capability.
pub struct BackendRegistry {
    backends: Vec<Arc<dyn ModelBackend>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            default_name: None,
        }
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: ModelBackend + 'static>(&mut self, backend: B) {
        self.register_shared(Arc::new(backend));
    }

    /// Register a backend the caller keeps a handle to.
    pub fn register_shared(&mut self, backend: Arc<dyn ModelBackend>) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.retain(|b| b.name() != name);
        self.backends.push(backend);
    }

    /// Builder-style `register`.
    pub fn with<B: ModelBackend + 'static>(mut self, backend: B) -> Self {
        self.register(backend);
        self
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if self.get(name).is_none() {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn ModelBackend>> {
        self.backends.iter().find(|b| b.name() == name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<Arc<dyn ModelBackend>> {
        self.default_name.as_deref().and_then(|name| self.get(name))
    }

    /// List registered backends in registration order.
    pub fn list(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Select a backend that currently supports the requested capability.
    ///
    /// Prefers the default backend when it supports the capability, then
    /// falls back to registration order.
    pub fn backend_for(&self, capability: Capability) -> Option<Arc<dyn ModelBackend>> {
        if let Some(default_backend) = self.default_backend() {
            if default_backend.supports(capability) {
                return Some(default_backend);
            }
        }
        self.backends
            .iter()
            .find(|b| b.supports(capability))
            .cloned()
    }

    /// Pure capability probe.
    pub fn supports(&self, capability: Capability) -> bool {
        self.backend_for(capability).is_some()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;

    #[test]
    fn first_registered_is_default() {
        let registry = BackendRegistry::new()
            .with(StubBackend::named("alpha").with_detections(Vec::new()))
            .with(StubBackend::named("beta").with_detections(Vec::new()));
        assert_eq!(registry.default_backend().unwrap().name(), "alpha");
        assert_eq!(registry.list(), vec!["alpha", "beta"]);
    }

    #[test]
    fn capability_selection_skips_unsupported_default() {
        let registry = BackendRegistry::new()
            .with(StubBackend::named("boxes").with_detections(Vec::new()))
            .with(StubBackend::named("masks").with_masks(Vec::new()));
        let chosen = registry.backend_for(Capability::PersonSegmentation).unwrap();
        assert_eq!(chosen.name(), "masks");
        assert!(!registry.supports(Capability::FeatureEmbedding));
    }

    #[test]
    fn set_default_requires_known_backend() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::named("alpha"));
        assert!(registry.set_default("missing").is_err());
        registry.register(StubBackend::named("beta"));
        registry.set_default("beta").unwrap();
        assert_eq!(registry.default_backend().unwrap().name(), "beta");
    }
}
