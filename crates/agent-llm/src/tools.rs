//! Tool definition types for LLM tool use

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool signature advertised to the model
///
/// `input_schema` is a JSON Schema object describing the arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (must match the tool in the registry)
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON schema for the tool's input parameters
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// Helpers to build JSON schemas for tools
///
/// ```
/// use agent_llm::tools::schema;
///
/// let schema = schema::object(
///     &[
///         ("name", schema::string("Ratio name")),
///         ("numerator", schema::number("Numerator")),
///     ],
///     &["name", "numerator"],
/// );
/// assert_eq!(schema["required"][1], "numerator");
/// ```
pub mod schema {
    use serde_json::{Map, Value, json};

    /// Object schema from ordered `(name, schema)` pairs
    pub fn object(properties: &[(&str, Value)], required: &[&str]) -> Value {
        let props: Map<String, Value> = properties
            .iter()
            .map(|(name, schema)| ((*name).to_string(), schema.clone()))
            .collect();
        json!({
            "type": "object",
            "properties": props,
            "required": required,
        })
    }

    /// String property schema
    pub fn string(description: &str) -> Value {
        json!({
            "type": "string",
            "description": description,
        })
    }

    /// String property restricted to a fixed vocabulary
    pub fn string_enum(description: &str, values: &[&str]) -> Value {
        json!({
            "type": "string",
            "description": description,
            "enum": values,
        })
    }

    /// Number property schema
    pub fn number(description: &str) -> Value {
        json!({
            "type": "number",
            "description": description,
        })
    }
}
