//! Validation of caller-supplied SQL and identifiers.
//!
//! Ad-hoc SQL passes three gates before it may reach the database:
//! - `denylist`: cheap substring check for mutation keywords
//! - `statement`: structural parse through `sqlparser`
//! - `validator`: the ordered pipeline producing a [`ValidationVerdict`]
//!
//! Identifier arguments of the introspection tools are checked by `identifier`.

pub mod denylist;
pub mod identifier;
pub mod statement;
pub mod validator;

pub use denylist::Denylist;
pub use identifier::{Identifier, validate_identifier};
pub use statement::{ParseError, ParsedStatement, SqlParser, StatementKind, StatementParser, StatementTree};
pub use validator::QueryValidator;

use crate::error::{DbError, DbResult};
use serde::Serialize;

/// Why a query or argument was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    EmptyQuery,
    DeniedKeyword,
    SyntaxError,
    MultipleStatements,
    NotASelect,
    InvalidIdentifier,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "empty_query",
            Self::DeniedKeyword => "denied_keyword",
            Self::SyntaxError => "syntax_error",
            Self::MultipleStatements => "multiple_statements",
            Self::NotASelect => "not_a_select",
            Self::InvalidIdentifier => "invalid_identifier",
        }
    }

    /// Hint returned to the caller alongside the rejection.
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::EmptyQuery => "Provide a SELECT statement",
            Self::DeniedKeyword => {
                "Remove the denied keyword. Column or table names containing it are rejected too"
            }
            Self::SyntaxError => "Fix the SQL syntax and retry",
            Self::MultipleStatements => "Send exactly one SELECT statement per call",
            Self::NotASelect => "Only a single plain SELECT statement can be explained",
            Self::InvalidIdentifier => {
                "Use a plain identifier such as users or public.users (letters, digits, _ and $)"
            }
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A refused query or argument, with a message naming the violated rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: ReasonCode,
    pub message: String,
}

impl Rejection {
    pub fn new(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Query text that passed validation and is ready for the sandboxed executor.
///
/// Only [`QueryValidator`] constructs values of this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery(String);

impl NormalizedQuery {
    pub(crate) fn new(sql: String) -> Self {
        Self(sql)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for NormalizedQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outcome of validating one raw query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationVerdict {
    Accepted(NormalizedQuery),
    Rejected(Rejection),
}

impl ValidationVerdict {
    pub fn rejected(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self::Rejected(Rejection::new(reason, message))
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }

    pub fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(rejection) => Some(rejection.reason),
        }
    }

    pub fn into_result(self) -> DbResult<NormalizedQuery> {
        match self {
            Self::Accepted(query) => Ok(query),
            Self::Rejected(rejection) => Err(DbError::from(rejection)),
        }
    }
}
