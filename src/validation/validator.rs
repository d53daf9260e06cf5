//! The ordered query validation pipeline.

use super::denylist::Denylist;
use super::statement::{SqlParser, StatementKind, StatementParser};
use super::{NormalizedQuery, ReasonCode, ValidationVerdict};
use crate::models::DatabaseType;
use std::sync::Arc;
use tracing::debug;

/// Validates raw caller SQL against a denylist and a statement parser.
///
/// Cheap to clone; the parser is shared.
#[derive(Clone)]
pub struct QueryValidator {
    denylist: Denylist,
    parser: Arc<dyn StatementParser>,
}

impl std::fmt::Debug for QueryValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryValidator")
            .field("denylist", &self.denylist)
            .finish_non_exhaustive()
    }
}

impl QueryValidator {
    pub fn new(denylist: Denylist, parser: Arc<dyn StatementParser>) -> Self {
        Self { denylist, parser }
    }

    /// Validator using the `sqlparser` dialect of `db_type`.
    pub fn for_database(db_type: DatabaseType, denylist: Denylist) -> Self {
        Self::new(denylist, Arc::new(SqlParser::new(db_type)))
    }

    pub fn denylist(&self) -> &Denylist {
        &self.denylist
    }

    /// Run every check in order and stop at the first failure.
    pub fn validate(&self, raw: &str) -> ValidationVerdict {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return ValidationVerdict::rejected(ReasonCode::EmptyQuery, "Query is empty");
        }

        if let Some(keyword) = self.denylist.find(trimmed) {
            debug!(keyword, "Query rejected by denylist");
            let message = if Denylist::is_tool_prefix(keyword) {
                format!(
                    "Query contains denied keyword '{}'. The tool adds the EXPLAIN prefix itself; \
                     pass only the SELECT statement",
                    keyword
                )
            } else {
                format!(
                    "Query contains denied keyword '{}'. Denylist: {}",
                    keyword,
                    self.denylist.keywords().join(", ")
                )
            };
            return ValidationVerdict::rejected(ReasonCode::DeniedKeyword, message);
        }

        let tree = match self.parser.parse(trimmed) {
            Ok(tree) => tree,
            Err(e) => {
                return ValidationVerdict::rejected(
                    ReasonCode::SyntaxError,
                    format!("Invalid SQL syntax: {}", e),
                );
            }
        };

        // A comment-only input parses to zero statements.
        let statement = match tree.statements.as_slice() {
            [] => return ValidationVerdict::rejected(ReasonCode::EmptyQuery, "Query is empty"),
            [statement] => statement,
            _ => {
                return ValidationVerdict::rejected(
                    ReasonCode::MultipleStatements,
                    format!(
                        "Multiple SQL statements are not allowed (found {})",
                        tree.len()
                    ),
                );
            }
        };

        if statement.kind != StatementKind::Select {
            return ValidationVerdict::rejected(
                ReasonCode::NotASelect,
                format!(
                    "Only SELECT statements are allowed, got {}",
                    statement.label
                ),
            );
        }

        ValidationVerdict::Accepted(NormalizedQuery::new(normalize(trimmed)))
    }
}

/// Strip trailing statement separators and surrounding whitespace.
fn normalize(query: &str) -> String {
    query
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}
