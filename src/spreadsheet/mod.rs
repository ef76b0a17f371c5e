//! # Spreadsheet Module
//!
//! Reads uploaded tabular files into a [`Table`] and writes tables back out.
//! Two formats are supported, picked by the file extension (case-insensitive):
//! comma-separated text (`.csv`) and Office Open XML workbooks (`.xlsx`).
pub(crate) mod cell;
pub mod csv;
pub(crate) mod reference;
pub(crate) mod sheet;
pub mod xlsx;
pub mod xlsx_writer;

use crate::error::SweeperError;
use crate::table::Table;
use std::fmt::Display;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors specific to reading spreadsheet data
#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Unsupported file type: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("File contains no header row")]
    EmptyFile,

    #[error("Line {line} has {found} fields, expected at most {expected}")]
    RaggedRow { line: u64, expected: usize, found: usize },

    #[error("Invalid workbook: {0}")]
    InvalidWorkbook(String),

    #[error("{0}")]
    Table(#[from] crate::table::TableError),
}

/// Tabular file formats the pipeline can read and write.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Xlsx,
}

impl FileFormat {
    /// Detects the format from the text after the last `.` of a file name.
    pub fn detect(name: &str) -> Result<FileFormat, SpreadsheetError> {
        let extension = extension_of(name);
        match extension.as_str() {
            ".csv" => Ok(FileFormat::Csv),
            ".xlsx" => Ok(FileFormat::Xlsx),
            _ => Err(SpreadsheetError::UnsupportedFormat { extension }),
        }
    }
}

impl Display for FileFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileFormat::Csv => write!(f, "csv"),
            FileFormat::Xlsx => write!(f, "xlsx"),
        }
    }
}

/// Lower-cased extension of a file name including its dot, or an empty string.
pub fn extension_of(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match base.rfind('.') {
        Some(index) if index > 0 => base[index..].to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// A file handed over by the user: its name and an immutable copy of its bytes.
#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Arc<[u8]>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        UploadedFile {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Parses an uploaded file into a table with an inferred schema.
pub fn read_table(file: &UploadedFile) -> Result<Table, SweeperError> {
    let format = FileFormat::detect(&file.name)?;
    let table = match format {
        FileFormat::Csv => self::csv::read_table(&file.bytes)?,
        FileFormat::Xlsx => self::xlsx::read_table(&file.bytes)?,
    };
    info!(
        file = %file.name,
        format = %format,
        rows = table.height(),
        columns = table.width(),
        "ingested file"
    );
    Ok(table)
}
