//! Query-related data models.
//!
//! This module defines the row-set type returned by sandboxed execution and the
//! string arguments accepted by tool calls.

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u64 = 300;

/// A single result row: column name to value.
pub type Row = serde_json::Map<String, JsonValue>;

/// Rows returned by one sandboxed execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryRows {
    /// Column names in result order
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub execution_time_ms: u64,
}

impl QueryRows {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Tool-call arguments as a string mapping.
///
/// MCP clients send arbitrary JSON; scalars are stringified, anything else is rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolArguments(BTreeMap<String, String>);

impl ToolArguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON object as received in a `tools/call` request.
    pub fn from_json(
        object: Option<&serde_json::Map<String, JsonValue>>,
    ) -> Result<Self, String> {
        let mut args = BTreeMap::new();
        let Some(object) = object else {
            return Ok(Self(args));
        };

        for (key, value) in object {
            let value = match value {
                JsonValue::Null => continue,
                JsonValue::String(s) => s.clone(),
                JsonValue::Bool(b) => b.to_string(),
                JsonValue::Number(n) => n.to_string(),
                JsonValue::Array(_) | JsonValue::Object(_) => {
                    return Err(format!("Argument '{}' must be a string", key));
                }
            };
            args.insert(key.clone(), value);
        }
        Ok(Self(args))
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
}
