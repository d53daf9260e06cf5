//! Data models for the diagnostics MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionConfigError, ConnectionInfo, DatabaseType};
pub use query::{
    DEFAULT_QUERY_TIMEOUT_SECS, MAX_QUERY_TIMEOUT_SECS, QueryRows, Row, ToolArguments,
};
