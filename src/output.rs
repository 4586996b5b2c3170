use crate::flatten::{ColumnSet, FlatRecord};
use anyhow::{Context, Result};
use serde_json::json;
use std::io::Write;

/// Key of the trailing line that lists the collected columns
pub const COLUMNS_KEY: &str = "_columns";

/// Writes flat records to a single output as JSON Lines
pub struct RecordWriter<W: Write> {
    writer: W,
    written: u64,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(writer: W) -> Self {
        RecordWriter { writer, written: 0 }
    }

    pub fn write_records(&mut self, records: &[FlatRecord]) -> Result<()> {
        for record in records {
            let json = serde_json::to_string(record).context("Failed to serialize record")?;
            writeln!(self.writer, "{}", json).context("Failed to write record")?;
            self.written += 1;
        }
        Ok(())
    }

    /// Write a `{"_columns": [...]}` line
    pub fn write_columns(&mut self, columns: &ColumnSet) -> Result<()> {
        let line = json!({ COLUMNS_KEY: columns });
        writeln!(self.writer, "{}", line).context("Failed to write column list")
    }

    /// Records written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }
}
