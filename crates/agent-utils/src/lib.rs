//! Shared utilities for the report agent workspace
//!
//! This crate provides common functionality used across the workspace,
//! including logging setup and environment-driven configuration helpers.

pub mod config;
pub mod logging;

pub use config::{Config, env_or, env_parse_or};
pub use logging::{init_tracing, init_tracing_with};
