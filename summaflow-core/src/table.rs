//! In-memory tabular data with CSV read/write.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::Path;

/// A header plus string-valued rows, the shape every stage passes around.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Build a table, rejecting rows whose width differs from the header.
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != columns.len())
        {
            return Err(PipelineError::invalid_input(format!(
                "row {idx} has {} fields, header has {}",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Parse CSV with a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(reader);

        let columns: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        if columns.is_empty() {
            return Err(PipelineError::content("CSV input has no header row"));
        }

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self { columns, rows })
    }

    pub fn from_csv_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    /// Read a CSV file from disk.
    pub fn read_csv(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let file = std::fs::File::open(path)?;
        let table = Self::from_reader(std::io::BufReader::new(file))?;
        tracing::debug!(
            path = %path.display(),
            rows = table.row_count(),
            "CSV file read"
        );
        Ok(table)
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn to_csv_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_csv(&mut buf)?;
        Ok(buf)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Result<Vec<&str>> {
        let idx = self.column_index(name).ok_or_else(|| {
            PipelineError::invalid_input(format!(
                "column '{name}' not found (available: {})",
                self.columns.join(", ")
            ))
        })?;
        Ok(self.rows.iter().map(|r| r[idx].as_str()).collect())
    }

    /// New table holding the given rows, in the given order.
    pub fn select(&self, indices: &[usize]) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: indices.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }

    /// Append a column; `values` must have one entry per row.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<String>) -> Result<()> {
        let name = name.into();
        if values.len() != self.rows.len() {
            return Err(PipelineError::invalid_input(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample() -> Table {
        Table::from_rows(
            vec!["dialogue".into(), "summary".into()],
            vec![
                vec!["Amanda: hi, Tom".into(), "greeting".into()],
                vec!["Tom: \"bye\"".into(), "farewell".into()],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_csv_write_then_read_preserves_quoting() {
        let table = sample();
        let bytes = table.to_csv_bytes().unwrap();
        let parsed = Table::from_csv_bytes(&bytes).unwrap();
        assert_eq!(parsed, table);
    }

    #[test]
    fn test_from_rows_rejects_ragged() {
        let err = Table::from_rows(vec!["a".into()], vec![vec!["1".into(), "2".into()]]);
        assert!(matches!(err, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn test_read_csv_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Table::read_csv(&dir.path().join("nope.csv")).unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }

    #[test]
    fn test_empty_input_is_content_error() {
        let err = Table::from_csv_bytes(b"").unwrap_err();
        assert!(matches!(err, PipelineError::Content(_)));
    }

    #[test]
    fn test_select_and_column_values() {
        let table = sample();
        let picked = table.select(&[1]);
        assert_eq!(picked.row_count(), 1);
        assert_eq!(picked.column_values("summary").unwrap(), vec!["farewell"]);
        assert!(table.column_values("missing").is_err());
    }

    #[test]
    fn test_push_column() {
        let mut table = sample();
        table
            .push_column("labels", vec!["[1]".into(), "[2]".into()])
            .unwrap();
        assert_eq!(table.columns(), &["dialogue", "summary", "labels"]);
        assert_eq!(table.rows()[1][2], "[2]");
        assert!(table.push_column("bad", vec![]).is_err());
    }
}
