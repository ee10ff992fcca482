//! Timestamp-keyed numeric tables

use anyhow::{bail, Result};

/// One row: a timestamp plus one value per numeric column (`NaN` = missing)
#[derive(Debug, Clone, PartialEq)]
pub struct Row<T> {
    pub timestamp: T,
    pub values: Vec<f64>,
}

/// A time series with an explicit timestamp column and numeric columns
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeriesTable<T> {
    timestamp_column: String,
    columns: Vec<String>,
    rows: Vec<Row<T>>,
}

impl<T> TimeSeriesTable<T> {
    /// Empty table; headers are trimmed
    pub fn new<I, S>(timestamp_column: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            timestamp_column: timestamp_column.trim().to_string(),
            columns: columns
                .into_iter()
                .map(|c| c.as_ref().trim().to_string())
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, timestamp: T, values: Vec<f64>) -> Result<()> {
        if values.len() != self.columns.len() {
            bail!(
                "Row has {} values but the table has {} columns",
                values.len(),
                self.columns.len()
            );
        }
        self.rows.push(Row { timestamp, values });
        Ok(())
    }

    pub fn timestamp_column(&self) -> &str {
        &self.timestamp_column
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Timestamp column followed by the numeric columns
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(self.timestamp_column.as_str())
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    pub fn rows(&self) -> &[Row<T>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn timestamps(&self) -> impl Iterator<Item = &T> + '_ {
        self.rows.iter().map(|row| &row.timestamp)
    }

    /// Values of one numeric column, if it exists
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let index = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row.values[index]).collect())
    }

    /// Remove rows whose numeric values are all missing
    pub fn drop_empty_rows(&mut self) {
        self.rows
            .retain(|row| row.values.iter().any(|value| !value.is_nan()));
    }

    /// Convert every timestamp, failing on the first one that can't be converted
    pub fn map_timestamps<U, F>(self, mut f: F) -> Result<TimeSeriesTable<U>>
    where
        F: FnMut(T) -> Result<U>,
    {
        let rows = self
            .rows
            .into_iter()
            .map(|row| {
                Ok(Row {
                    timestamp: f(row.timestamp)?,
                    values: row.values,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TimeSeriesTable {
            timestamp_column: self.timestamp_column,
            columns: self.columns,
            rows,
        })
    }
}

/// Lenient numeric parse: anything that isn't a number becomes `NaN`
pub fn coerce_numeric(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(f64::NAN)
}
