//! Tool errors

use thiserror::Error;

/// Result type for tool execution
pub type Result<T> = std::result::Result<T, ToolError>;

/// Errors a tool can raise
///
/// None of these abort a reasoning loop: the loop renders them as the text
/// result of the call so the model can react.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// No tool registered under that name
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// Arguments missing or of the wrong type
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}
