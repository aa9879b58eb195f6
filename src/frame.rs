//! In-memory relation shared by every stage of the job.
//!
//! Cells are `Option<String>`; `None` is null. Rows always have exactly one
//! cell per column.

use anyhow::{Result, anyhow, ensure};

pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    name: String,
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Frame {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a frame from string literals; empty strings become null.
    pub fn from_literal(name: &str, columns: &[&str], rows: &[&[&str]]) -> Result<Self> {
        let mut frame = Frame::new(name, columns.iter().map(|c| c.to_string()).collect());
        for row in rows {
            frame.push_row(
                row.iter()
                    .map(|cell| (!cell.is_empty()).then(|| cell.to_string()))
                    .collect(),
            )?;
        }
        Ok(frame)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| {
            anyhow!(
                "Column '{name}' not found in '{}' (available: {})",
                self.name,
                self.columns.join(", ")
            )
        })
    }

    pub fn push_row(&mut self, row: Row) -> Result<()> {
        ensure!(
            row.len() == self.columns.len(),
            "Row has {} cell(s) but '{}' has {} column(s)",
            row.len(),
            self.name,
            self.columns.len()
        );
        self.rows.push(row);
        Ok(())
    }

    /// Adds a column that is null for every existing row.
    pub fn add_column(&mut self, name: impl Into<String>) -> usize {
        self.columns.push(name.into());
        for row in &mut self.rows {
            row.push(None);
        }
        self.columns.len() - 1
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx)?.as_deref()
    }

    /// Rows rendered for display, null as the empty string.
    pub fn display_rows(&self, limit: usize) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| row.iter().map(|cell| cell.clone().unwrap_or_default()).collect())
            .collect()
    }
}
