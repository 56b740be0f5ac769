//! Flat result table for a finished (or halted, or cancelled) batch.

use std::io::Write;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::{ItemId, WorkItem};

const HEADER: [&str; 4] = ["id", "status", "message", "attempts"];

/// One exported item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultRow {
    /// Item id
    pub id: ItemId,
    /// Human label of the final status (`Success`, `Error`, `Pending`, ...)
    pub status: String,
    /// Last status detail, empty if none
    pub message: String,
    /// Retries scheduled for the item
    pub attempts: u32,
}

impl From<&WorkItem> for ResultRow {
    fn from(item: &WorkItem) -> Self {
        Self {
            id: item.id.clone(),
            status: item.status.label().to_string(),
            message: item.message.clone().unwrap_or_default(),
            attempts: item.attempt,
        }
    }
}

/// One row per item of a batch, in batch order
///
/// Unresolved items (left `Waiting` or `Processing` by a halt or cancel) are
/// included, so the row count always equals the batch size.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResultTable {
    rows: Vec<ResultRow>,
}

impl ResultTable {
    /// Build the table from a queue snapshot
    pub fn from_items(items: &[WorkItem]) -> Self {
        Self {
            rows: items.iter().map(ResultRow::from).collect(),
        }
    }

    /// Rows in batch order
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    /// Number of rows (the batch size)
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the batch was empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write the table as CSV with a header row and every value quoted
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .quote_style(csv::QuoteStyle::Always)
            .from_writer(writer);

        csv_writer.write_record(HEADER)?;
        for row in &self.rows {
            let attempts = row.attempts.to_string();
            let id = row.id.to_string();
            csv_writer.write_record([
                id.as_str(),
                row.status.as_str(),
                row.message.as_str(),
                attempts.as_str(),
            ])?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Render the table as a CSV string
    pub fn to_csv(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        String::from_utf8(buf).map_err(|e| Error::Other(format!("CSV output is not UTF-8: {}", e)))
    }

    /// Render the table as a JSON array of rows
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.rows)?)
    }
}
