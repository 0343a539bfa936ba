//! Tool trait definition

use crate::Result;
use agent_llm::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;

/// Trait for tools that agents can execute
///
/// `S` is the per-conversation state the tool may read or update. Tools that
/// need no state simply ignore it.
#[async_trait]
pub trait Tool<S: Send>: Send + Sync {
    /// Execute the tool with given parameters
    ///
    /// The returned text is appended to the conversation verbatim.
    async fn execute(&self, params: Value, state: &mut S) -> Result<String>;

    /// Get the tool's name
    ///
    /// Must be unique within a ToolRegistry
    fn name(&self) -> &str;

    /// Get the tool's description
    ///
    /// This description helps the LLM understand when to use this tool
    fn description(&self) -> &str;

    /// Get the tool's input schema (JSON Schema format)
    ///
    /// See [`agent_llm::tools::schema`] for helpers.
    fn input_schema(&self) -> Value;

    /// Definition advertised to the model
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// Argument accessors shared by tool implementations
pub mod params {
    use crate::{Result, ToolError};
    use serde_json::Value;

    /// Required string argument
    pub fn required_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
        params
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParameters(format!("missing string argument `{key}`")))
    }

    /// Required numeric argument
    ///
    /// Numeric strings are accepted since models sometimes quote numbers.
    pub fn required_f64(params: &Value, key: &str) -> Result<f64> {
        optional_f64(params, key)?
            .ok_or_else(|| ToolError::InvalidParameters(format!("missing numeric argument `{key}`")))
    }

    /// Optional numeric argument; absent or `null` gives `None`
    pub fn optional_f64(params: &Value, key: &str) -> Result<Option<f64>> {
        match params.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(Value::String(s)) => s
                .trim()
                .replace([',', '，'], "")
                .parse::<f64>()
                .map(Some)
                .map_err(|_| ToolError::InvalidParameters(format!("`{key}` is not a number: {s}"))),
            Some(other) => Err(ToolError::InvalidParameters(format!(
                "`{key}` is not a number: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::params::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let p = json!({"query": "营业收入"});
        assert_eq!(required_str(&p, "query").unwrap(), "营业收入");
        assert!(required_str(&p, "path").is_err());
    }

    #[test]
    fn test_numeric_arguments() {
        let p = json!({"a": 2.5, "b": "1,000", "c": null, "d": true});
        assert_eq!(required_f64(&p, "a").unwrap(), 2.5);
        assert_eq!(required_f64(&p, "b").unwrap(), 1000.0);
        assert_eq!(optional_f64(&p, "c").unwrap(), None);
        assert_eq!(optional_f64(&p, "missing").unwrap(), None);
        assert!(optional_f64(&p, "d").is_err());
        assert!(required_f64(&p, "c").is_err());
    }
}
