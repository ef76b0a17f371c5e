//! # Cleaning Operations
//!
//! Duplicate removal and mean imputation. Both take the table as it stands and
//! return a new one together with a report of what changed.
use crate::table::Column;
use crate::table::ColumnType;
use crate::table::Table;
use crate::table::Value;
use serde::Deserialize;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Display;
use tracing::debug;

/// A cleaning step the user asked for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningOperation {
    RemoveDuplicates,
    FillMissing,
}

impl CleaningOperation {
    pub fn apply(&self, table: &Table) -> (Table, CleaningReport) {
        match self {
            CleaningOperation::RemoveDuplicates => {
                let (table, removed) = remove_duplicates(table);
                (table, CleaningReport::RemoveDuplicates { removed })
            }
            CleaningOperation::FillMissing => {
                let (table, report) = fill_missing(table);
                (table, CleaningReport::FillMissing(report))
            }
        }
    }
}

/// What a cleaning step changed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum CleaningReport {
    RemoveDuplicates { removed: usize },
    FillMissing(FillReport),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FillReport {
    pub filled: Vec<FilledColumn>,
    /// Numeric columns with missing entries but no value to average
    pub skipped: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilledColumn {
    pub name: String,
    pub mean: f64,
    pub cells: usize,
}

impl FillReport {
    pub fn cells(&self) -> usize {
        self.filled.iter().map(|column| column.cells).sum()
    }
}

impl Display for CleaningReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CleaningReport::RemoveDuplicates { removed: 1 } => write!(f, "Duplicates removed! (1 row)"),
            CleaningReport::RemoveDuplicates { removed } => write!(f, "Duplicates removed! ({removed} rows)"),
            CleaningReport::FillMissing(report) => {
                write!(
                    f,
                    "Missing values have been filled! ({} cells in {} columns)",
                    report.cells(),
                    report.filled.len()
                )?;
                if !report.skipped.is_empty() {
                    write!(f, "; no values to average in: {}", report.skipped.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

/// Drops every row equal to an earlier row, keeping first occurrences in order.
/// Missing values compare equal to each other.
pub fn remove_duplicates(table: &Table) -> (Table, usize) {
    let mut seen = HashSet::<&[Value]>::with_capacity(table.height());
    let mut rows = Vec::with_capacity(table.height());
    for row in table.rows() {
        if seen.insert(row.as_slice()) {
            rows.push(row.clone());
        }
    }
    let removed = table.height() - rows.len();
    debug!(removed, "removed duplicate rows");
    let table = Table {
        columns: table.columns().to_vec(),
        rows,
    };
    (table, removed)
}

/// Replaces missing entries of every numeric column with the mean of that column's
/// present values. Integer columns that receive a fill become floating point.
/// Columns with nothing to average stay missing and are reported as skipped.
pub fn fill_missing(table: &Table) -> (Table, FillReport) {
    let mut columns: Vec<Column> = table.columns().to_vec();
    let mut rows: Vec<Vec<Value>> = table.rows().to_vec();
    let mut report = FillReport::default();

    for index in table.numeric_columns() {
        let missing = table.column_values(index).filter(|value| value.is_missing()).count();
        if missing == 0 {
            continue;
        }
        let present: Vec<f64> = table.column_values(index).filter_map(Value::as_f64).filter(|value| !value.is_nan()).collect();
        if present.is_empty() {
            report.skipped.push(columns[index].name.to_owned());
            continue;
        }
        let mean = present.iter().sum::<f64>() / present.len() as f64;

        let column = &mut columns[index];
        let promote = column.kind == ColumnType::BigInt;
        column.kind = ColumnType::Double;
        for row in rows.iter_mut() {
            let value = &mut row[index];
            if value.is_missing() {
                *value = Value::Float(mean);
            } else if promote {
                if let Value::Int(number) = *value {
                    *value = Value::Float(number as f64);
                }
            }
        }
        debug!(column = %column.name, mean, cells = missing, "filled missing values");
        report.filled.push(FilledColumn {
            name: column.name.to_owned(),
            mean,
            cells: missing,
        });
    }

    (Table { columns, rows }, report)
}
