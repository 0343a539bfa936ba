//! Tool management and execution framework
//!
//! Tools are functions the model may call during a reasoning loop. Each tool
//! operates on a caller-owned state value `S` (for example the document
//! loaded in the current conversation), so no tool needs process-wide
//! mutable state.

pub mod error;
pub mod registry;
pub mod tool;

pub use error::{Result, ToolError};
pub use registry::ToolRegistry;
pub use tool::{Tool, params};
