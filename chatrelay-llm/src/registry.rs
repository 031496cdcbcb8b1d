// ABOUTME: Registry pattern for runtime completion backend selection.
// ABOUTME: Backends register factories, chatrelay creates one by provider name from config.

use crate::config::BackendConfig;
use crate::traits::CompletionBackend;
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Factory function that creates a backend from config
pub type BackendFactory =
    Box<dyn Fn(&BackendConfig) -> Result<Arc<dyn CompletionBackend>> + Send + Sync>;

/// Registry for runtime backend selection
pub struct BackendRegistry {
    factories: HashMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a backend factory by name
    pub fn register<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(&BackendConfig) -> Result<Arc<dyn CompletionBackend>> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
        self
    }

    /// Create a backend by name with the given config
    pub fn create(&self, name: &str, config: &BackendConfig) -> Result<Arc<dyn CompletionBackend>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| anyhow!("Unknown completion provider: {}", name))?;
        factory(config)
    }

    /// Create the backend named by `config.provider`
    pub fn create_from_config(&self, config: &BackendConfig) -> Result<Arc<dyn CompletionBackend>> {
        self.create(&config.provider, config)
    }

    /// List available backend names
    pub fn available(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        use crate::backends::mock::MockBackend;
        use crate::backends::openai::OpenAiBackend;

        Self::new()
            .register("openai", OpenAiBackend::factory())
            .register("mock", MockBackend::factory())
    }
}
