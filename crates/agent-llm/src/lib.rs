//! LLM provider abstraction layer
//!
//! This crate provides provider-agnostic abstractions for talking to chat
//! models with function calling. It includes:
//!
//! - Role-tagged message types (`system`, `user`, `assistant`, `tool`)
//! - Completion request/response types
//! - Tool definitions for function calling
//! - The [`LLMProvider`] trait and an OpenAI-compatible implementation
//!   (DeepSeek speaks the same wire format)

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;
pub mod tools;

#[cfg(feature = "openai")]
pub mod providers;

#[cfg(any(test, feature = "testing"))]
pub mod mock;

// Re-export main types
pub use completion::{CompletionRequest, CompletionResponse, StopReason, TokenUsage};
pub use error::{LLMError, Result};
pub use messages::{ContentBlock, Message, MessageContent, Role};
pub use provider::LLMProvider;
pub use tools::ToolDefinition;
