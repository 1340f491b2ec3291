//! Output formatters for command results.

use clap::ValueEnum;
use comfy_table::{Cell, Table};
use serde_json::Value;

/// Output format for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// ASCII table format
    Table,
    /// JSON format
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Table => write!(f, "table"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Trait for formatting output.
pub trait Formatter: Send + Sync {
    /// Format a command result.
    fn format_value(&self, value: &Value) -> String;

    /// Format an error message.
    fn format_error(&self, error: &str) -> String;
}

/// Create a formatter for the given output format.
pub fn create_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Table => Box::new(TableFormatter),
        OutputFormat::Json => Box::new(JsonFormatter),
    }
}

/// Table formatter using comfy-table.
///
/// Arrays of objects become one row per element, objects become a
/// field/value table and nested values are printed as compact JSON.
pub struct TableFormatter;

impl Formatter for TableFormatter {
    fn format_value(&self, value: &Value) -> String {
        match value {
            Value::Array(rows) if rows.is_empty() => "No results".to_string(),
            Value::Array(rows) => format_rows(rows),
            Value::Object(map) => {
                let mut table = Table::new();
                table.set_header(vec!["field", "value"]);
                for (key, value) in map {
                    table.add_row(vec![Cell::new(key), Cell::new(format_cell(value))]);
                }
                table.to_string()
            }
            other => format_cell(other),
        }
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}", error)
    }
}

/// JSON formatter.
pub struct JsonFormatter;

impl Formatter for JsonFormatter {
    fn format_value(&self, value: &Value) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string())
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({ "error": error }).to_string()
    }
}

/// Format an array as a table, with the union of object keys as columns.
fn format_rows(rows: &[Value]) -> String {
    let mut columns: Vec<&str> = Vec::new();
    for row in rows {
        if let Value::Object(map) = row {
            for key in map.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }
    }

    let mut table = Table::new();
    if columns.is_empty() {
        table.set_header(vec!["value"]);
        for row in rows {
            table.add_row(vec![format_cell(row)]);
        }
    } else {
        table.set_header(columns.clone());
        for row in rows {
            let cells: Vec<String> = columns
                .iter()
                .map(|column| row.get(*column).map(format_cell).unwrap_or_default())
                .collect();
            table.add_row(cells);
        }
    }

    format!("{}\n{} row(s)", table, rows.len())
}

/// Format a value as a display string.
fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_table_rows_use_all_columns() {
        let output = TableFormatter.format_value(&json!([
            { "id": "a", "status": "pending" },
            { "id": "b", "error_msg": "boom" },
        ]));
        assert!(output.contains("status"));
        assert!(output.contains("error_msg"));
        assert!(output.contains("boom"));
        assert!(output.ends_with("2 row(s)"));
    }

    #[test]
    fn test_table_object_and_empty() {
        let output = TableFormatter.format_value(&json!({ "id": "m1", "completed_at": null }));
        assert!(output.contains("m1"));
        assert!(output.contains("NULL"));
        assert_eq!(TableFormatter.format_value(&json!([])), "No results");
    }

    #[test]
    fn test_json_round_trips() {
        let value = json!({ "outcome": "not_triggered" });
        let output = JsonFormatter.format_value(&value);
        assert_eq!(serde_json::from_str::<Value>(&output).unwrap(), value);
        assert_eq!(
            JsonFormatter.format_error("nope"),
            r#"{"error":"nope"}"#
        );
    }
}
