//! Tool registry and dispatcher.
//!
//! The registry is built once at startup from the query catalog, the fixed
//! tools and the opted-in EXPLAIN tools, and is read-only afterwards.

use crate::catalog::{ArgKind, CatalogQuery, QueryCatalog};
use crate::db::{DbPool, SandboxedExecutor};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseType, ToolArguments};
use crate::tools::diagnose;
use crate::tools::explain::{ExplainFlags, ExplainInput, ExplainMode, ExplainTool};
use crate::tools::foreign_keys::{ForeignKeyCheck, ForeignKeyInput};
use crate::tools::format::{OutputFormat, ToolOutput};
use rmcp::model::JsonObject;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Input for catalog queries without arguments.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CatalogInput {
    /// Output format: "json" returns rows, "table" returns ASCII table, "markdown" returns markdown table
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

/// Input for the diagnose tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DiagnoseInput {
    /// Output format: "json" returns rows, "table" returns ASCII table, "markdown" returns markdown table
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

/// Static metadata of one exposed tool.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Arc<JsonObject>,
}

impl ToolDescriptor {
    pub fn to_tool(&self) -> rmcp::model::Tool {
        rmcp::model::Tool::new(
            self.name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        )
    }
}

/// What a tool call does.
#[derive(Debug, Clone)]
pub enum Invocation {
    Catalog(&'static CatalogQuery),
    MissingFkConstraints,
    MissingFkIndexes,
    Diagnose,
    Explain(ExplainTool),
}

#[derive(Debug, Clone)]
pub struct ToolEntry {
    pub descriptor: ToolDescriptor,
    pub invocation: Invocation,
}

/// Immutable name-keyed set of tools.
#[derive(Debug)]
pub struct ToolRegistry {
    db_type: DatabaseType,
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn builder(db_type: DatabaseType) -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            db_type,
            entries: Vec::new(),
            duplicate: None,
        }
    }

    /// The full registry for `db_type`: catalog, fixed tools, opted-in EXPLAIN tools.
    pub fn standard(db_type: DatabaseType, flags: ExplainFlags) -> DbResult<Self> {
        Self::builder(db_type)
            .with_catalog(QueryCatalog::list_queries(db_type))
            .with_fixed_tools()
            .with_explain(flags)
            .build()
    }

    pub fn db_type(&self) -> DatabaseType {
        self.db_type
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.descriptor.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub struct ToolRegistryBuilder {
    db_type: DatabaseType,
    entries: Vec<ToolEntry>,
    duplicate: Option<String>,
}

impl ToolRegistryBuilder {
    /// Register one tool per catalog entry, leaving out skipped and unsupported entries.
    pub fn with_catalog<I>(mut self, queries: I) -> Self
    where
        I: IntoIterator<Item = &'static CatalogQuery>,
    {
        for query in queries {
            if query.is_skipped() || !query.supports(self.db_type) {
                debug!(query = query.name, "Catalog entry not exposed");
                continue;
            }
            self = self.register(ToolEntry {
                descriptor: ToolDescriptor {
                    name: query.name.to_string(),
                    description: query.description.to_string(),
                    input_schema: catalog_schema(query),
                },
                invocation: Invocation::Catalog(query),
            });
        }
        self
    }

    /// Register `diagnose`, plus the foreign key tools on PostgreSQL.
    pub fn with_fixed_tools(mut self) -> Self {
        if self.db_type == DatabaseType::PostgreSQL {
            for (check, invocation) in [
                (
                    ForeignKeyCheck::MissingConstraints,
                    Invocation::MissingFkConstraints,
                ),
                (ForeignKeyCheck::MissingIndexes, Invocation::MissingFkIndexes),
            ] {
                self = self.register(ToolEntry {
                    descriptor: ToolDescriptor {
                        name: check.tool_name().to_string(),
                        description: check.description().to_string(),
                        input_schema: schema_for::<ForeignKeyInput>(),
                    },
                    invocation,
                });
            }
        }

        self.register(ToolEntry {
            descriptor: ToolDescriptor {
                name: diagnose::TOOL_NAME.to_string(),
                description: diagnose::DESCRIPTION.to_string(),
                input_schema: schema_for::<DiagnoseInput>(),
            },
            invocation: Invocation::Diagnose,
        })
    }

    /// Register the EXPLAIN tools the operator opted into.
    pub fn with_explain(mut self, flags: ExplainFlags) -> Self {
        for mode in flags.modes() {
            match ExplainTool::new(mode, self.db_type) {
                Some(tool) => self = self.register_explain(tool),
                None => warn!(
                    tool = mode.tool_name(),
                    db_type = %self.db_type,
                    "Tool not supported by this database, not registering"
                ),
            }
        }
        self
    }

    fn register_explain(self, tool: ExplainTool) -> Self {
        let mode: ExplainMode = tool.mode();
        self.register(ToolEntry {
            descriptor: ToolDescriptor {
                name: mode.tool_name().to_string(),
                description: mode.description().to_string(),
                input_schema: schema_for::<ExplainInput>(),
            },
            invocation: Invocation::Explain(tool),
        })
    }

    /// Add an entry. The first duplicate name is kept and reported by `build`.
    pub fn register(mut self, entry: ToolEntry) -> Self {
        let name = &entry.descriptor.name;
        if self.entries.iter().any(|e| &e.descriptor.name == name) {
            if self.duplicate.is_none() {
                self.duplicate = Some(name.clone());
            }
            return self;
        }
        self.entries.push(entry);
        self
    }

    pub fn build(self) -> DbResult<ToolRegistry> {
        if let Some(name) = self.duplicate {
            return Err(DbError::duplicate_tool(name));
        }

        let index = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.descriptor.name.clone(), i))
            .collect();

        info!(
            db_type = %self.db_type,
            tools = self.entries.len(),
            "Tool registry built"
        );

        Ok(ToolRegistry {
            db_type: self.db_type,
            entries: self.entries,
            index,
        })
    }
}

/// JSON schema of `T` with subschemas inlined, as MCP clients expect.
pub fn schema_for<T: JsonSchema>() -> Arc<JsonObject> {
    let generator = schemars::generate::SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();
    let mut object = match serde_json::to_value(schema) {
        Ok(JsonValue::Object(object)) => object,
        _ => JsonObject::new(),
    };
    object.remove("$schema");
    Arc::new(object)
}

/// Schema for a catalog entry: the common `format` argument plus the entry's own.
fn catalog_schema(query: &CatalogQuery) -> Arc<JsonObject> {
    let mut schema = Arc::unwrap_or_clone(schema_for::<CatalogInput>());
    if query.args.is_empty() {
        return Arc::new(schema);
    }

    let properties = schema
        .entry("properties")
        .or_insert_with(|| json!({}));
    if let Some(properties) = properties.as_object_mut() {
        for arg in query.args {
            let kind = match arg.kind {
                ArgKind::Identifier => "string",
                ArgKind::Integer => "integer",
            };
            properties.insert(
                arg.name.to_string(),
                json!({ "type": kind, "description": arg.description }),
            );
        }
    }

    let required: Vec<JsonValue> = query
        .args
        .iter()
        .filter(|a| a.required)
        .map(|a| JsonValue::from(a.name))
        .collect();
    if !required.is_empty() {
        schema.insert("required".to_string(), JsonValue::Array(required));
    }
    Arc::new(schema)
}

/// Routes tool calls to their invocation.
#[derive(Debug)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    pool: DbPool,
    executor: SandboxedExecutor,
}

impl ToolDispatcher {
    pub fn new(registry: Arc<ToolRegistry>, pool: DbPool, executor: SandboxedExecutor) -> Self {
        Self {
            registry,
            pool,
            executor,
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub async fn call(&self, name: &str, args: &ToolArguments) -> DbResult<ToolOutput> {
        let entry = self
            .registry
            .get(name)
            .ok_or_else(|| DbError::tool_not_found(name))?;
        let format = OutputFormat::from_argument(args.get("format"))?;

        let executor = &self.executor;
        let pool = &self.pool;
        let rows = match &entry.invocation {
            Invocation::Catalog(query) => {
                QueryCatalog::run_query(executor, pool, query, args).await?
            }
            Invocation::MissingFkConstraints => {
                ForeignKeyCheck::MissingConstraints
                    .run(executor, pool, args)
                    .await?
            }
            Invocation::MissingFkIndexes => {
                ForeignKeyCheck::MissingIndexes
                    .run(executor, pool, args)
                    .await?
            }
            Invocation::Diagnose => {
                let start = Instant::now();
                let results = diagnose::run(executor, pool).await;
                diagnose::into_rows(results, start.elapsed().as_millis() as u64)
            }
            Invocation::Explain(tool) => tool.run(executor, pool, args).await?,
        };

        Ok(ToolOutput::new(name, rows, format))
    }
}
