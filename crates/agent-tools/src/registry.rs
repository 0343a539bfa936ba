//! Tool registry for managing available tools

use crate::{Result, Tool, ToolError};
use agent_llm::ToolDefinition;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Registry for managing tools
///
/// Keeps registration order so the definitions sent to the model are stable
/// across turns.
pub struct ToolRegistry<S: Send> {
    tools: Vec<Arc<dyn Tool<S>>>,
}

impl<S: Send> Default for ToolRegistry<S> {
    fn default() -> Self {
        Self { tools: Vec::new() }
    }
}

impl<S: Send> ToolRegistry<S> {
    /// Create a new tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name in place
    pub fn register(&mut self, tool: Arc<dyn Tool<S>>) {
        if let Some(slot) = self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            debug!(tool = tool.name(), "Replacing registered tool");
            *slot = tool;
        } else {
            self.tools.push(tool);
        }
    }

    /// Builder-style registration
    pub fn with(mut self, tool: impl Tool<S> + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool<S>>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Execute the named tool against `state`
    pub async fn execute(&self, name: &str, params: Value, state: &mut S) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params, state).await
    }

    /// Definitions for every tool, in registration order
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Names of every tool, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Get the number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct Counter(&'static str);

    #[async_trait]
    impl Tool<u32> for Counter {
        async fn execute(&self, _params: Value, state: &mut u32) -> Result<String> {
            *state += 1;
            Ok(format!("{} -> {}", self.0, state))
        }

        fn name(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "increments the counter"
        }

        fn input_schema(&self) -> Value {
            json!({"type": "object", "properties": {}})
        }
    }

    #[test]
    fn test_registration_order() {
        let registry = ToolRegistry::new()
            .with(Counter("b"))
            .with(Counter("a"))
            .with(Counter("b"));

        assert_eq!(registry.names(), vec!["b", "a"]);
        assert_eq!(registry.definitions()[1].name, "a");
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_mutates_state() {
        let registry = ToolRegistry::new().with(Counter("inc"));
        let mut state = 0;

        registry.execute("inc", json!({}), &mut state).await.unwrap();
        let out = registry.execute("inc", json!({}), &mut state).await.unwrap();

        assert_eq!(state, 2);
        assert_eq!(out, "inc -> 2");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let registry: ToolRegistry<u32> = ToolRegistry::new();
        let mut state = 0;
        let err = registry.execute("nope", json!({}), &mut state).await;
        assert_eq!(err, Err(ToolError::NotFound("nope".to_string())));
    }
}
