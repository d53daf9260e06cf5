//! MCP service implementation using rmcp.
//!
//! The tool set is data: it depends on the target database and the EXPLAIN
//! opt-in flags. `DiagService` therefore implements `ServerHandler` by hand
//! (`list_tools` / `call_tool`) on top of the registry instead of using the
//! `#[tool_router]` macros.

use crate::error::DbError;
use crate::models::ToolArguments;
use crate::tools::{ToolDispatcher, ToolOutput};
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        AnnotateAble, CallToolRequestParam, CallToolResult, Content, Implementation, JsonObject,
        ListResourcesResult, ListToolsResult, PaginatedRequestParam, ProtocolVersion, RawResource,
        ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents,
        ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};
use std::sync::Arc;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

/// Bundled tool and configuration guide, served as a text resource.
const README: &str = include_str!("../../README.md");
pub const README_URI: &str = "docs://pg-diag-mcp/README.md";

#[derive(Clone)]
pub struct DiagService {
    dispatcher: Arc<ToolDispatcher>,
}

impl DiagService {
    pub fn new(dispatcher: Arc<ToolDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &ToolDispatcher {
        &self.dispatcher
    }

    /// MCP descriptors of every registered tool, in registration order.
    pub fn tools(&self) -> Vec<Tool> {
        self.dispatcher
            .registry()
            .descriptors()
            .map(|d| d.to_tool())
            .collect()
    }

    pub fn resources(&self) -> Vec<Resource> {
        let mut readme = RawResource::new(README_URI, "README");
        readme.description = Some("The README for pg-diag-mcp".to_owned());
        readme.mime_type = Some("text/plain".to_owned());
        readme.size = u32::try_from(README.len()).ok();
        vec![readme.no_annotation()]
    }

    pub fn read(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        if uri != README_URI {
            return Err(McpError::resource_not_found(
                format!("Unknown resource: {}", uri),
                Some(serde_json::json!({ "uri": uri })),
            ));
        }
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: README_URI.to_owned(),
                mime_type: Some("text/plain".to_owned()),
                text: README.to_owned(),
                meta: None,
            }],
        })
    }

    /// Run one tool call inside its own `tool_call` span.
    pub async fn handle_call(
        &self,
        name: &str,
        arguments: Option<&JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        let call_id = Uuid::new_v4();
        let span = info_span!("tool_call", tool = %name, call_id = %call_id);

        self.dispatch(name, arguments).instrument(span).await
    }

    async fn dispatch(
        &self,
        name: &str,
        arguments: Option<&JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        let args = ToolArguments::from_json(arguments).map_err(DbError::invalid_input)?;
        match self.dispatcher.call(name, &args).await {
            Ok(output) => {
                info!(
                    rows = output.row_count,
                    execution_time_ms = output.execution_time_ms,
                    "Tool call succeeded"
                );
                Ok(CallToolResult::success(vec![into_content(&output)?]))
            }
            Err(e) => {
                warn!(
                    error = %e,
                    reason = ?e.reason(),
                    retryable = e.is_retryable(),
                    "Tool call failed"
                );
                Err(e.into())
            }
        }
    }
}

fn into_content(output: &ToolOutput) -> Result<Content, McpError> {
    match &output.formatted {
        Some(text) => Ok(Content::text(text.clone())),
        None => Content::json(output),
    }
}

impl ServerHandler for DiagService {
    fn get_info(&self) -> ServerInfo {
        let explain_note = match (
            self.dispatcher.registry().contains("explain"),
            self.dispatcher.registry().contains("explain_analyze"),
        ) {
            (false, false) => "Ad-hoc EXPLAIN tools are disabled on this server.",
            (_, false) => {
                "`explain` takes a single SELECT without the EXPLAIN prefix. \
                 Queries containing mutation keywords are rejected, even inside identifiers \
                 such as `updated_at`."
            }
            (_, true) => {
                "`explain` / `explain_analyze` take a single SELECT without the EXPLAIN prefix. \
                 Queries containing mutation keywords are rejected, even inside identifiers \
                 such as `updated_at`. `explain_analyze` executes the query: functions with \
                 effects outside the transaction (e.g. `pg_terminate_backend`) still take effect."
            }
        };

        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "pg-diag-mcp".to_owned(),
                title: Some("Database Diagnostics MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Read-only diagnostics for a {} database.\n\
                \n\
                ## Workflow\n\
                1. Call `diagnose` for an overall health check\n\
                2. Drill down with the introspection tools (cache hit rates, index usage, locks, sizes)\n\
                3. Table tools (`table_schema`, `table_foreign_keys`, `table_index_info`) take `table_name`\n\
                4. Read the `README` resource for the full tool list\n\
                \n\
                ## Notes\n\
                - Every statement runs in a transaction that is always rolled back\n\
                - All tools accept `format`: json (default), table or markdown\n\
                - {}",
                self.dispatcher.registry().db_type(),
                explain_note
            )),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(self.tools()))
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(self.resources()))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        self.read(&request.uri)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.handle_call(&request.name, request.arguments.as_ref())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolOptions;
    use crate::db::{DbPool, SandboxedExecutor};
    use crate::models::ConnectionConfig;
    use crate::tools::{ExplainFlags, ToolRegistry};
    use std::time::Duration;

    async fn sqlite_service(dir: &tempfile::TempDir, flags: ExplainFlags) -> DiagService {
        let path = dir.path().join("service.db");
        let config = ConnectionConfig::new(
            format!("sqlite://{}?mode=rwc", path.display()),
            Some("service".to_string()),
            PoolOptions::default(),
        )
        .unwrap();
        let pool = DbPool::connect(&config, Duration::from_secs(5)).await.unwrap();
        if let DbPool::SQLite(p) = &pool {
            sqlx::query("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
                .execute(p)
                .await
                .unwrap();
        }
        let registry = Arc::new(ToolRegistry::standard(pool.db_type(), flags).unwrap());
        let dispatcher =
            ToolDispatcher::new(registry, pool, SandboxedExecutor::new(Duration::from_secs(5)));
        DiagService::new(Arc::new(dispatcher))
    }

    fn text_of(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"][0]["text"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_server_info() {
        let dir = tempfile::tempdir().unwrap();
        let service = sqlite_service(&dir, ExplainFlags::default()).await;
        let info = service.get_info();
        assert_eq!(info.server_info.name, "pg-diag-mcp");
        assert!(info.capabilities.tools.is_some());
        assert!(info.capabilities.resources.is_some());
        assert!(info.instructions.unwrap().contains("disabled"));
    }

    #[tokio::test]
    async fn test_readme_resource() {
        let dir = tempfile::tempdir().unwrap();
        let service = sqlite_service(&dir, ExplainFlags::default()).await;

        let resources = service.resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].raw.uri, README_URI);
        assert_eq!(resources[0].raw.mime_type.as_deref(), Some("text/plain"));

        let result = service.read(README_URI).unwrap();
        let ResourceContents::TextResourceContents { text, mime_type, .. } = &result.contents[0]
        else {
            panic!("text contents expected");
        };
        assert_eq!(mime_type.as_deref(), Some("text/plain"));
        assert!(text.contains("missing_fk_indexes"));
        assert!(text.contains("explain_analyze"));

        let err = service.read("docs://pg-diag-mcp/missing").unwrap_err();
        assert_eq!(err.code.0, -32002);
    }

    #[tokio::test]
    async fn test_instructions_without_explain_analyze() {
        let dir = tempfile::tempdir().unwrap();
        let flags = ExplainFlags {
            explain: true,
            explain_analyze: true,
        };
        // SQLite never registers explain_analyze.
        let service = sqlite_service(&dir, flags).await;
        let instructions = service.get_info().instructions.unwrap();
        assert!(instructions.contains("`explain` takes a single SELECT"));
        assert!(!instructions.contains("pg_terminate_backend"));
    }

    #[tokio::test]
    async fn test_tools_follow_registry() {
        let dir = tempfile::tempdir().unwrap();
        let service = sqlite_service(&dir, ExplainFlags::default()).await;
        let names: Vec<String> = service.tools().iter().map(|t| t.name.to_string()).collect();
        assert!(names.contains(&"tables".to_string()));
        assert!(names.contains(&"diagnose".to_string()));
        assert!(!names.contains(&"explain".to_string()));
    }

    #[tokio::test]
    async fn test_call_returns_json_rows() {
        let dir = tempfile::tempdir().unwrap();
        let service = sqlite_service(&dir, ExplainFlags::default()).await;
        let result = service.handle_call("tables", None).await.unwrap();
        let body: serde_json::Value = serde_json::from_str(&text_of(&result)).unwrap();
        assert_eq!(body["tool"], "tables");
        assert_eq!(body["rows"][0]["name"], "users");
    }

    #[tokio::test]
    async fn test_call_with_markdown_format() {
        let dir = tempfile::tempdir().unwrap();
        let service = sqlite_service(&dir, ExplainFlags::default()).await;
        let args = serde_json::json!({"table_name": "users", "format": "markdown"});
        let result = service
            .handle_call("table_schema", args.as_object())
            .await
            .unwrap();
        let text = text_of(&result);
        assert!(text.starts_with("| column_name |"));
        assert!(text.contains("| id |"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let service = sqlite_service(&dir, ExplainFlags::default()).await;
        let err = service.handle_call("explain", None).await.unwrap_err();
        assert_eq!(err.code.0, -32002);
    }

    #[tokio::test]
    async fn test_rejection_carries_reason() {
        let dir = tempfile::tempdir().unwrap();
        let flags = ExplainFlags {
            explain: true,
            explain_analyze: false,
        };
        let service = sqlite_service(&dir, flags).await;
        let args = serde_json::json!({"query": "SELECT 1; SELECT 2"});
        let err = service
            .handle_call("explain", args.as_object())
            .await
            .unwrap_err();
        assert_eq!(err.code.0, -32602);
        assert_eq!(err.data.unwrap()["reason"], "multiple_statements");
    }

    #[tokio::test]
    async fn test_nested_arguments_are_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let service = sqlite_service(&dir, ExplainFlags::default()).await;
        let args = serde_json::json!({"table_name": {"name": "users"}});
        let err = service
            .handle_call("table_schema", args.as_object())
            .await
            .unwrap_err();
        assert_eq!(err.code.0, -32602);
    }
}
