//! Identifier arguments (`table_name` and friends).

use super::{ReasonCode, Rejection};

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// A validated `name` or `schema.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identifier {
    pub schema: Option<String>,
    pub name: String,
}

impl Identifier {
    /// Bind values for catalog templates: the name, then the schema (or NULL).
    pub fn bind_values(&self) -> Vec<Option<String>> {
        vec![Some(self.name.clone()), self.schema.clone()]
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Check that `value` is a plain, unquoted identifier.
pub fn validate_identifier(value: &str) -> Result<Identifier, Rejection> {
    let invalid = |detail: &str| {
        Rejection::new(
            ReasonCode::InvalidIdentifier,
            format!("Invalid identifier '{}': {}", value, detail),
        )
    };

    let parts: Vec<&str> = value.split('.').collect();
    let (schema, name) = match parts.as_slice() {
        [name] => (None, *name),
        [schema, name] => (Some(*schema), *name),
        _ => return Err(invalid("expected name or schema.name")),
    };

    for part in schema.iter().chain(std::iter::once(&name)) {
        check_part(part).map_err(invalid)?;
    }

    Ok(Identifier {
        schema: schema.map(str::to_string),
        name: name.to_string(),
    })
}

fn check_part(part: &str) -> Result<(), &'static str> {
    let mut chars = part.chars();
    let Some(first) = chars.next() else {
        return Err("empty name");
    };
    if part.len() > MAX_IDENTIFIER_LEN {
        return Err("longer than 63 bytes");
    }
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err("must start with a letter or underscore");
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return Err("only letters, digits, '_' and '$' are allowed");
    }
    Ok(())
}
