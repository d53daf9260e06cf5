//! MCP tool implementations.
//!
//! - `registry`: the immutable tool registry and the dispatcher
//! - `explain`: ad-hoc `explain` / `explain_analyze` (opt-in)
//! - `foreign_keys`: `missing_fk_constraints` / `missing_fk_indexes`
//! - `diagnose`: database health check
//! - `format`: json / table / markdown output

pub mod diagnose;
pub mod explain;
pub mod foreign_keys;
pub mod format;
pub mod registry;

pub use explain::{ExplainFlags, ExplainMode, ExplainTool};
pub use format::{OutputFormat, ToolOutput};
pub use registry::{Invocation, ToolDescriptor, ToolDispatcher, ToolEntry, ToolRegistry};
