//! # Table Model
//!
//! The in-memory rectangular structure every pipeline step works on: ordered, uniquely
//! named and typed columns (the schema, inferred once at ingestion) plus ordered rows.
pub mod column;
pub mod value;

pub use column::Column;
pub use column::ColumnType;
pub use value::Value;

use std::collections::HashMap;
use std::collections::HashSet;
use thiserror::Error;

/// Errors related to table construction and projection.
#[derive(Error, Debug, PartialEq)]
pub enum TableError {
    #[error("Duplicate column name '{0}'")]
    DuplicateColumn(String),

    #[error("Unknown column '{0}'")]
    UnknownColumn(String),

    #[error("Row {row} has {found} values, expected {expected}")]
    RowWidth { row: usize, expected: usize, found: usize },
}

/// Ordered columns and ordered rows, with unique column names.
#[derive(Clone, Debug, PartialEq)]
pub struct Table {
    pub(crate) columns: Vec<Column>,
    pub(crate) rows: Vec<Vec<Value>>,
}

impl Table {
    /// Creates a table, checking name uniqueness and row widths.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<Value>>) -> Result<Self, TableError> {
        let mut names = HashSet::new();
        for column in &columns {
            if !names.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.to_owned()));
            }
        }
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(TableError::RowWidth {
                    row: index,
                    expected: columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(Table { columns, rows })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|column| column.name.to_owned()).collect()
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Iterates over the values of one column, top to bottom.
    pub fn column_values(&self, index: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().map(move |row| &row[index])
    }

    /// The first `n` rows.
    pub fn head(&self, n: usize) -> &[Vec<Value>] {
        &self.rows[..n.min(self.rows.len())]
    }

    /// Indexes of the numeric columns, in column order.
    pub fn numeric_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.kind.is_numeric())
            .map(|(index, _)| index)
            .collect()
    }

    /// Projects the table onto the named columns, in the given order.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Table, TableError> {
        let mut seen = HashSet::new();
        let mut indexes = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if !seen.insert(name) {
                return Err(TableError::DuplicateColumn(name.to_owned()));
            }
            let index = self
                .column_index(name)
                .ok_or_else(|| TableError::UnknownColumn(name.to_owned()))?;
            indexes.push(index);
        }
        let columns = indexes.iter().map(|index| self.columns[*index].clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| indexes.iter().map(|index| row[*index].clone()).collect())
            .collect();
        Ok(Table { columns, rows })
    }
}

/// Makes header names unique the way spreadsheet readers conventionally do:
/// blank names become `Unnamed: {index}`, repeats get `.1`, `.2`, ... suffixes.
pub fn unique_column_names(raw: Vec<String>) -> Vec<String> {
    let mut counts = HashMap::<String, usize>::new();
    raw.into_iter()
        .enumerate()
        .map(|(index, name)| {
            let mut name = if name.trim().is_empty() {
                format!("Unnamed: {index}")
            } else {
                name
            };
            let mut count = counts.get(&name).copied().unwrap_or(0);
            while count > 0 {
                counts.insert(name.to_owned(), count + 1);
                name = format!("{name}.{count}");
                count = counts.get(&name).copied().unwrap_or(0);
            }
            counts.insert(name.to_owned(), count + 1);
            name
        })
        .collect()
}
