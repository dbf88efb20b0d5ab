//! Capability Registry — name → processor factory table.
//!
//! Backends register a factory under a capability name at start-up; the core
//! never hard-codes a processor list. Registration takes `&mut self` and is
//! init-time only; after that the registry is shared read-only across
//! queries (wrap it in an `Arc` via [`CapabilityRegistry::shared`]).

use std::collections::HashMap;
use std::sync::Arc;

use crate::processor::Processor;

/// Error type for registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no capability registered under '{0}'")]
    UnknownCapability(String),

    #[error("capability '{name}' rejected its arguments: {reason}")]
    InvalidArgs { name: String, reason: String },
}

/// Builds a processor instance from instantiation arguments.
pub type ProcessorFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Box<dyn Processor>, RegistryError> + Send + Sync>;

/// Shared reference to a frozen registry.
pub type SharedRegistry = Arc<CapabilityRegistry>;

/// Process-wide table of capability factories.
#[derive(Default)]
pub struct CapabilityRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under a capability name. A later registration
    /// under the same name replaces the earlier one.
    pub fn register(&mut self, name: impl Into<String>, factory: ProcessorFactory) {
        self.factories.insert(name.into(), factory);
    }

    /// Convenience wrapper for registering a plain closure.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Box<dyn Processor>, RegistryError>
            + Send
            + Sync
            + 'static,
    {
        self.register(name, Arc::new(factory));
    }

    /// Instantiate the capability registered under `name`.
    pub fn instantiate(
        &self,
        name: &str,
        args: &serde_json::Value,
    ) -> Result<Box<dyn Processor>, RegistryError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RegistryError::UnknownCapability(name.to_string()))?;
        factory(args)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered capability names, sorted for reproducible listings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Freeze the registry into a shareable handle.
    pub fn shared(self) -> SharedRegistry {
        Arc::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::{AskContext, ProcessorError, ProcessorReply};
    use async_trait::async_trait;

    struct EchoProcessor {
        prefix: String,
    }

    #[async_trait]
    impl Processor for EchoProcessor {
        async fn ask(&self, ctx: &AskContext) -> Result<ProcessorReply, ProcessorError> {
            Ok(ProcessorReply::new(format!("{}: {}", self.prefix, ctx.query)))
        }
    }

    fn echo_factory(args: &serde_json::Value) -> Result<Box<dyn Processor>, RegistryError> {
        let prefix = args
            .get("prefix")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RegistryError::InvalidArgs {
                name: "echo".to_string(),
                reason: "missing string field 'prefix'".to_string(),
            })?;
        Ok(Box::new(EchoProcessor {
            prefix: prefix.to_string(),
        }))
    }

    #[tokio::test]
    async fn test_register_and_instantiate() {
        let mut registry = CapabilityRegistry::new();
        registry.register_fn("echo", echo_factory);
        assert!(registry.contains("echo"));

        let processor = registry
            .instantiate("echo", &serde_json::json!({"prefix": "lang"}))
            .unwrap();
        let reply = processor.ask(&AskContext::new("hello")).await.unwrap();
        assert_eq!(reply.gist, "lang: hello");
    }

    #[test]
    fn test_unknown_capability() {
        let registry = CapabilityRegistry::new();
        let err = registry
            .instantiate("telepathy", &serde_json::Value::Null)
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::UnknownCapability(name) if name == "telepathy"));
    }

    #[test]
    fn test_factory_rejects_bad_args() {
        let mut registry = CapabilityRegistry::new();
        registry.register_fn("echo", echo_factory);

        let err = registry
            .instantiate("echo", &serde_json::json!({}))
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::InvalidArgs { .. }));
    }

    #[test]
    fn test_names_are_sorted() {
        let mut registry = CapabilityRegistry::new();
        registry.register_fn("vision", echo_factory);
        registry.register_fn("audio", echo_factory);
        registry.register_fn("math", echo_factory);
        assert_eq!(registry.names(), vec!["audio", "math", "vision"]);
    }
}
