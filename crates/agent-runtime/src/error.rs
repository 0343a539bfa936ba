//! Runtime errors

use agent_llm::LLMError;
use thiserror::Error;

/// Result type for reasoning loop operations
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Ways a reasoning loop can end without a final answer
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The model kept requesting tools past the configured ceiling
    #[error("Recursion limit of {limit} reached without a final answer")]
    RecursionLimitExceeded { limit: usize },

    /// The model provider failed
    #[error("Model provider error: {0}")]
    Provider(#[from] LLMError),

    /// The run was cancelled or its consumer went away
    #[error("Reasoning loop cancelled")]
    Cancelled,

    /// The session store failed
    #[error("Session error: {0}")]
    Session(String),
}
