//! Lexical denylist filter.
//!
//! A fast pre-parse check: the lower-cased query is scanned for mutation keywords
//! as plain substrings. This produces false positives (`updated_at` contains
//! `update`) and is never the only control; the statement parser is authoritative.

/// Keywords rejected for every ad-hoc query.
pub const BASE_KEYWORDS: &[&str] = &[
    "delete", "insert", "update", "truncate", "drop", "alter", "create", "grant", "begin",
    "commit",
];

/// Base keywords plus the prefixes the EXPLAIN tools add themselves.
pub const EXPLAIN_KEYWORDS: &[&str] = &[
    "delete", "insert", "update", "truncate", "drop", "alter", "create", "grant", "begin",
    "commit", "explain", "analyze",
];

/// An immutable keyword set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denylist {
    keywords: &'static [&'static str],
}

impl Denylist {
    pub const fn base() -> Self {
        Self {
            keywords: BASE_KEYWORDS,
        }
    }

    /// The denylist used by the `explain` and `explain_analyze` tools.
    pub const fn for_explain() -> Self {
        Self {
            keywords: EXPLAIN_KEYWORDS,
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        self.keywords
    }

    /// Return the first denied keyword contained in `query`, case-insensitively.
    pub fn find(&self, query: &str) -> Option<&'static str> {
        let lowered = query.to_lowercase();
        self.keywords
            .iter()
            .copied()
            .find(|keyword| lowered.contains(keyword))
    }

    pub fn rejects(&self, query: &str) -> bool {
        self.find(query).is_some()
    }

    /// True when `keyword` is one of the prefixes an EXPLAIN tool supplies.
    pub fn is_tool_prefix(keyword: &str) -> bool {
        !BASE_KEYWORDS.contains(&keyword)
    }
}

impl Default for Denylist {
    fn default() -> Self {
        Self::base()
    }
}
