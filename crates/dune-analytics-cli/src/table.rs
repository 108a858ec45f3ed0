// Rust guideline compliant 2026-10-17
//! Compact markdown rendering of JSON rows for terminal output.

use serde_json::Value;

pub(crate) const DEFAULT_CELL_CHARS: usize = 40;
const MAX_COLUMNS: usize = 8;

/// Columns in first-seen order across all rows, capped at `MAX_COLUMNS`.
fn columns(rows: &[Value]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for row in rows {
        let Some(obj) = row.as_object() else {
            continue;
        };
        for key in obj.keys() {
            if out.len() >= MAX_COLUMNS {
                return out;
            }
            if !out.iter().any(|c| c == key) {
                out.push(key.clone());
            }
        }
    }
    out
}

pub(crate) fn compact_cell(value: &Value, max_chars: usize) -> String {
    let text = match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let single_line = text.replace('\n', " ").replace('|', "\\|");
    if single_line.chars().count() <= max_chars {
        single_line
    } else {
        let mut out: String = single_line.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}

/// Render rows as a markdown table with a row-number column.
pub(crate) fn render_rows(rows: &[Value], max_chars: usize) -> String {
    if rows.is_empty() {
        return String::from("(no rows)\n");
    }
    let cols = columns(rows);
    if cols.is_empty() {
        return rows
            .iter()
            .map(|r| format!("{r}\n"))
            .collect::<String>();
    }

    let mut out = String::new();
    out.push_str("| # | ");
    out.push_str(&cols.join(" | "));
    out.push_str(" |\n|---|");
    for _ in &cols {
        out.push_str("---|");
    }
    out.push('\n');

    for (idx, row) in rows.iter().enumerate() {
        out.push_str(&format!("| {} |", idx + 1));
        for col in &cols {
            let cell = row
                .get(col)
                .map(|v| compact_cell(v, max_chars))
                .unwrap_or_default();
            out.push_str(&format!(" {cell} |"));
        }
        out.push('\n');
    }
    out
}
