// Run report rendering
//
// Structured formats go through serde; text is an aligned report of labelled
// fields followed by an optional table of failed tasks.

use std::fmt::Write as _;

use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

/// Width of the label column in text reports
const LABEL_WIDTH: usize = 12;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn is_text(self) -> bool {
        self == OutputFormat::Text
    }

    /// Serialize `value` for the structured formats; `None` for text
    pub fn render<T: Serialize>(self, value: &T) -> Result<Option<String>> {
        Ok(match self {
            OutputFormat::Text => None,
            OutputFormat::Json => Some(serde_json::to_string_pretty(value)? + "\n"),
            OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
        })
    }
}

/// Plain-text run report
#[derive(Debug, Default)]
pub struct TextReport {
    fields: Vec<(&'static str, String)>,
    columns: Vec<(&'static str, usize)>,
    rows: Vec<Vec<String>>,
}

impl TextReport {
    pub fn field(&mut self, label: &'static str, value: impl ToString) -> &mut Self {
        self.fields.push((label, value.to_string()));
        self
    }

    /// Table appended after the fields; rows wider than a column are cut
    pub fn table(
        &mut self,
        columns: &[(&'static str, usize)],
        rows: Vec<Vec<String>>,
    ) -> &mut Self {
        self.columns = columns.to_vec();
        self.rows = rows;
        self
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (label, value) in &self.fields {
            let _ = writeln!(out, "{:<width$} {value}", format!("{label}:"), width = LABEL_WIDTH);
        }
        if self.rows.is_empty() {
            return out;
        }

        out.push('\n');
        let header: Vec<String> = self.columns.iter().map(|(name, _)| name.to_string()).collect();
        for cells in std::iter::once(&header).chain(&self.rows) {
            let line: Vec<String> = self
                .columns
                .iter()
                .zip(cells)
                .map(|((_, width), cell)| format!("{:<width$}", clip(cell, *width), width = width))
                .collect();
            let _ = writeln!(out, "{}", line.join("  ").trim_end());
        }
        out
    }
}

fn clip(value: &str, width: usize) -> String {
    if value.chars().count() <= width {
        return value.to_string();
    }
    let kept: String = value.chars().take(width.saturating_sub(3)).collect();
    format!("{kept}...")
}
