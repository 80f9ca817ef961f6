//! Output formatting helpers for CLI output.

use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{ContentArrangement, Table};

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::UTF8_BORDERS_ONLY);
    table.set_header(headers);
    table
}

/// Listing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned table
    Table,
    /// One JSON object per line
    #[value(alias = "json")]
    Jsonl,
    /// Tab separated values, no header
    Tsv,
}

impl OutputFormat {
    /// Table on a terminal, JSON lines otherwise.
    pub fn detect() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Jsonl
        }
    }
}

/// Render rows of string cells under `columns`.
pub fn render_rows(columns: &[&str], rows: &[Vec<String>], format: OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(columns);
            for row in rows {
                table.add_row(row);
            }
            format!("{table}\n")
        }
        OutputFormat::Jsonl => {
            let mut out = String::new();
            for row in rows {
                let object: serde_json::Map<String, serde_json::Value> = columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| (column.to_string(), serde_json::Value::String(cell.clone())))
                    .collect();
                out.push_str(&serde_json::Value::Object(object).to_string());
                out.push('\n');
            }
            out
        }
        OutputFormat::Tsv => {
            let mut out = String::new();
            for row in rows {
                out.push_str(&row.join("\t"));
                out.push('\n');
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<String>> {
        vec![
            vec!["counter1".to_string(), "a/b, c/d".to_string()],
            vec!["limits".to_string(), String::new()],
        ]
    }

    #[test]
    fn test_new_table() {
        let table = new_table(&["NAME", "IMAGE"]);
        let output = table.to_string();
        assert!(output.contains("NAME"));
        assert!(output.contains("IMAGE"));
    }

    #[test]
    fn test_render_table() {
        let output = render_rows(&["name", "topics"], &rows(), OutputFormat::Table);
        assert!(output.contains("name"));
        assert!(output.contains("counter1"));
        assert!(output.contains("a/b, c/d"));
    }

    #[test]
    fn test_render_jsonl() {
        let output = render_rows(&["name", "topics"], &rows(), OutputFormat::Jsonl);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["name"], "counter1");
        assert_eq!(first["topics"], "a/b, c/d");
    }

    #[test]
    fn test_render_tsv() {
        let output = render_rows(&["name", "topics"], &rows(), OutputFormat::Tsv);
        assert_eq!(output, "counter1\ta/b, c/d\nlimits\t\n");
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::from_str("json", true).unwrap(), OutputFormat::Jsonl);
        assert_eq!(OutputFormat::from_str("tsv", true).unwrap(), OutputFormat::Tsv);
        assert!(OutputFormat::from_str("yaml", true).is_err());
    }
}
