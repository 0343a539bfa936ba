//! Agent runtime for tool-augmented reasoning
//!
//! This crate provides the [`ReasoningLoop`], which alternates between the
//! model and a tool registry until the model answers in plain text, along
//! with the per-thread [`ConversationSession`] it reads and writes.

pub mod error;
pub mod executor;
pub mod session;

// Re-export key types
pub use error::{Result, RuntimeError};
pub use executor::{LoopConfig, ReasoningLoop, ReasoningLoopBuilder, ToolInvocation, TurnEvent};
pub use session::{
    ConversationSession, MemorySessionStore, SessionHandle, SessionStore, ToolCallRecord,
};
