//! MCP server integration module.
//!
//! Bridges the rmcp protocol handler to the tool dispatcher.

pub mod service;

pub use service::DiagService;
