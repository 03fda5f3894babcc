//! Interactive shell support: ASCII table rendering and the command interpreter.

use std::collections::BTreeSet;

use crate::exec::QueryResult;

pub mod shell;

pub use shell::{Shell, Step};

/// Column width cap to keep output readable.
pub const MAX_COL_WIDTH: usize = 60;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Query rows as a table. Selected columns keep their select-list order; `*` shows the
    /// union of returned properties sorted by id.
    pub fn from_results(rows: &[QueryResult]) -> Self {
        let mut columns: Vec<String> = match rows.first().and_then(|r| r.property_names.clone()) {
            Some(names) => names,
            None => rows.iter()
                .flat_map(|r| r.properties.keys().cloned())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        let score_col = rows.first().and_then(|r| r.score.as_ref()).map(|s| s.column_name.clone());
        if let Some(s) = &score_col { columns.push(s.clone()); }
        let body = rows.iter().map(|r| {
            columns.iter().map(|c| {
                if Some(c) == score_col.as_ref() {
                    return r.score.as_ref().map(|s| format!("{:.3}", s.value)).unwrap_or_default();
                }
                r.property(c).map(|v| v.display()).unwrap_or_else(|| "NULL".to_string())
            }).collect()
        }).collect();
        Table { columns, rows: body }
    }

    pub fn render(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| display_len(c).min(MAX_COL_WIDTH)).collect();
        for r in &self.rows {
            for (i, cell) in r.iter().enumerate().take(widths.len()) {
                let w = display_len(cell);
                if w > widths[i] { widths[i] = w.min(MAX_COL_WIDTH); }
            }
        }
        let sep = build_separator(&widths);
        let mut out = Vec::with_capacity(self.rows.len() + 5);
        out.push(sep.clone());
        out.push(build_row(&self.columns, &widths));
        out.push(sep.clone());
        for r in &self.rows { out.push(build_row(r, &widths)); }
        out.push(sep);
        out.push(format!("rows: {}, cols: {}", self.rows.len(), self.columns.len()));
        out.join("\n")
    }
}

fn display_len(s: &str) -> usize { s.chars().count() }

fn build_separator(widths: &[usize]) -> String {
    let mut s = String::from("+");
    for w in widths {
        s.push_str(&"-".repeat(*w + 2));
        s.push('+');
    }
    s
}

fn build_row(cells: &[String], widths: &[usize]) -> String {
    let mut s = String::from("|");
    for (i, w) in widths.iter().enumerate() {
        let cell = cells.get(i).map(|c| c.as_str()).unwrap_or("");
        let text = truncate(cell, *w);
        let pad = " ".repeat(w.saturating_sub(display_len(&text)));
        s.push(' ');
        if is_numeric_like(cell) {
            s.push_str(&pad);
            s.push_str(&text);
        } else {
            s.push_str(&text);
            s.push_str(&pad);
        }
        s.push_str(" |");
    }
    s
}

fn truncate(s: &str, max: usize) -> String {
    if display_len(s) <= max { return s.to_string(); }
    if max <= 1 { return "…".to_string(); }
    s.chars().take(max - 1).collect::<String>() + "…"
}

// crude detection for aligning numbers to the right
fn is_numeric_like(s: &str) -> bool {
    let st = s.trim();
    let mut has_digit = false;
    for ch in st.chars() {
        if ch.is_ascii_digit() { has_digit = true; continue; }
        if ".-+eE,_".contains(ch) { continue; }
        return false;
    }
    has_digit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_aligned_columns() {
        let t = Table {
            columns: vec!["cmis:name".into(), "samples".into()],
            rows: vec![vec!["Apollo 17".into(), "111".into()], vec!["Apollo 8".into(), "0".into()]],
        };
        let out = t.render();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "+-----------+---------+");
        assert_eq!(lines[1], "| cmis:name | samples |");
        assert_eq!(lines[3], "| Apollo 17 |     111 |");
        assert_eq!(lines[4], "| Apollo 8  |       0 |");
        assert_eq!(lines[6], "rows: 2, cols: 2");
    }

    #[test]
    fn long_cells_are_truncated() {
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("abc", 4), "abc");
        assert!(!is_numeric_like("Apollo 8"));
        assert!(is_numeric_like("-3.5e2"));
    }
}
