//! Output formatting for tool results.
//!
//! Every tool returns rows; the optional `format` argument selects JSON rows
//! (default) or a pre-rendered ASCII / markdown table.

use crate::error::{DbError, DbResult};
use crate::models::{QueryRows, Row};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Output format for tool results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON rows (default)
    #[default]
    Json,
    /// ASCII table (like psql)
    Table,
    /// Markdown table
    Markdown,
}

impl OutputFormat {
    /// Parse the `format` tool argument; absent or blank means JSON.
    pub fn from_argument(value: Option<&str>) -> DbResult<Self> {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(Self::Json);
        };
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            "markdown" => Ok(Self::Markdown),
            _ => Err(DbError::invalid_input(format!(
                "Unknown format '{}'. Expected json, table or markdown",
                value
            ))),
        }
    }
}

/// The result of one tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub tool: String,
    pub columns: Vec<String>,
    /// Result rows. Omitted when the output is pre-formatted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Row>>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    /// Pre-formatted output when format is table or markdown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
}

impl ToolOutput {
    pub fn new(tool: impl Into<String>, result: QueryRows, format: OutputFormat) -> Self {
        let row_count = result.row_count();
        let (rows, formatted) = match format {
            OutputFormat::Json => (Some(result.rows), None),
            OutputFormat::Table => (
                None,
                Some(format_as_table(
                    &result.columns,
                    &result.rows,
                    result.execution_time_ms,
                )),
            ),
            OutputFormat::Markdown => (
                None,
                Some(format_as_markdown(&result.columns, &result.rows)),
            ),
        };

        Self {
            tool: tool.into(),
            columns: result.columns,
            rows,
            row_count,
            execution_time_ms: result.execution_time_ms,
            formatted,
        }
    }
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

pub fn format_as_table(columns: &[String], rows: &[Row], execution_time_ms: u64) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            if let Some(value) = row.get(col) {
                widths[i] = widths[i].max(format_value(value).width());
            }
        }
    }

    let mut output = String::new();
    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(col, w)| format!("| {} ", pad(col, *w, Align::Center)))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);
    output.push_str(&separator);

    for row in rows {
        let line: String = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                let align = if value.is_number() {
                    Align::Right
                } else {
                    Align::Left
                };
                format!("| {} ", pad(&format_value(value), *w, align))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    output.push_str(&format!(
        "{} {} ({:.2} sec)\n",
        rows.len(),
        row_text,
        execution_time_ms as f64 / 1000.0
    ));

    output
}

pub fn format_as_markdown(columns: &[String], rows: &[Row]) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output = String::new();

    let header: String = columns
        .iter()
        .map(|c| format!("| {} ", c))
        .collect::<String>()
        + "|\n";
    output.push_str(&header);

    let sep: String = columns.iter().map(|_| "|---").collect::<String>() + "|\n";
    output.push_str(&sep);

    for row in rows {
        let line: String = columns
            .iter()
            .map(|col| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                // Pipes and newlines would break the table layout.
                let cell = format_value(value).replace('|', "\\|").replace('\n', " ");
                format!("| {} ", cell)
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    output.push_str(&format!("\n*{} rows*", rows.len()));

    output
}

enum Align {
    Left,
    Right,
    Center,
}

/// Pad by display width; `format!` width counts chars, which misaligns CJK text.
fn pad(text: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(text.width());
    match align {
        Align::Left => format!("{}{}", text, " ".repeat(fill)),
        Align::Right => format!("{}{}", " ".repeat(fill), text),
        Align::Center => {
            let left = fill / 2;
            format!("{}{}{}", " ".repeat(left), text, " ".repeat(fill - left))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryRows {
        let mut row = Row::new();
        row.insert("name".into(), json!("users"));
        row.insert("count".into(), json!(42));
        QueryRows {
            columns: vec!["name".into(), "count".into()],
            rows: vec![row],
            execution_time_ms: 10,
        }
    }

    #[test]
    fn test_from_argument() {
        assert_eq!(OutputFormat::from_argument(None).unwrap(), OutputFormat::Json);
        assert_eq!(OutputFormat::from_argument(Some(" ")).unwrap(), OutputFormat::Json);
        assert_eq!(
            OutputFormat::from_argument(Some("Table")).unwrap(),
            OutputFormat::Table
        );
        assert!(OutputFormat::from_argument(Some("csv")).is_err());
    }

    #[test]
    fn test_table_output() {
        let result = sample();
        let table = format_as_table(&result.columns, &result.rows, 10);
        assert!(table.contains("| name  | count |"));
        assert!(table.contains("| users |    42 |"));
        assert!(table.contains("1 row (0.01 sec)"));
    }

    #[test]
    fn test_table_aligns_wide_characters() {
        let mut row = Row::new();
        row.insert("name".into(), json!("用户"));
        let table = format_as_table(&["name".to_string()], &[row], 0);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0].width(), lines[3].width());
    }

    #[test]
    fn test_markdown_escapes_pipes() {
        let mut row = Row::new();
        row.insert("definition".into(), json!("a | b"));
        let md = format_as_markdown(&["definition".to_string()], &[row]);
        assert!(md.contains("| a \\| b |"));
        assert!(md.ends_with("*1 rows*"));
    }

    #[test]
    fn test_tool_output_json_keeps_rows() {
        let output = ToolOutput::new("seq_scans", sample(), OutputFormat::Json);
        assert_eq!(output.row_count, 1);
        assert!(output.formatted.is_none());
        let value = serde_json::to_value(&output).unwrap();
        assert_eq!(value["rows"][0]["name"], "users");
    }

    #[test]
    fn test_tool_output_markdown_drops_rows() {
        let output = ToolOutput::new("seq_scans", sample(), OutputFormat::Markdown);
        assert!(output.rows.is_none());
        assert!(output.formatted.unwrap().starts_with("| name | count |"));
    }

    #[test]
    fn test_empty_result() {
        let output = ToolOutput::new("locks", QueryRows::default(), OutputFormat::Table);
        assert_eq!(output.formatted.as_deref(), Some("Empty set"));
    }
}
