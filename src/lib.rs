//! Database diagnostics MCP server library.
//!
//! Exposes a fixed catalog of read-only introspection queries, a health
//! check and opt-in sandboxed `EXPLAIN` tools for PostgreSQL and SQLite to
//! AI assistants over MCP (Model Context Protocol).

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;
pub mod validation;

pub use config::Config;
pub use error::DbError;
pub use mcp::DiagService;
