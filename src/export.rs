//! # Conversion & Export
//!
//! Serializes a table into a downloadable artifact in the chosen format.
use crate::error::SweeperError;
use crate::spreadsheet;
use crate::spreadsheet::extension_of;
use crate::table::Table;
use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

pub const CSV_MEDIA_TYPE: &str = "text/csv";
pub const XLSX_MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Output format of a conversion.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversionTarget {
    #[default]
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "xlsx", alias = "excel", alias = "spreadsheet")]
    Spreadsheet,
}

impl ConversionTarget {
    pub const fn extension(&self) -> &'static str {
        match self {
            ConversionTarget::Csv => ".csv",
            ConversionTarget::Spreadsheet => ".xlsx",
        }
    }

    pub const fn media_type(&self) -> &'static str {
        match self {
            ConversionTarget::Csv => CSV_MEDIA_TYPE,
            ConversionTarget::Spreadsheet => XLSX_MEDIA_TYPE,
        }
    }

    /// Name shown to the user.
    pub const fn label(&self) -> &'static str {
        match self {
            ConversionTarget::Csv => "CSV",
            ConversionTarget::Spreadsheet => "Excel",
        }
    }
}

impl Display for ConversionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for ConversionTarget {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "csv" => Ok(ConversionTarget::Csv),
            "xlsx" | "excel" | "spreadsheet" => Ok(ConversionTarget::Spreadsheet),
            _ => Err(format!("unknown conversion target '{value}', expected csv or xlsx")),
        }
    }
}

/// A serialized table ready to be saved by the user.
#[derive(Clone, Debug)]
pub struct DownloadArtifact {
    pub file_name: String,
    pub media_type: &'static str,
    pub bytes: Arc<[u8]>,
}

/// Artifact metadata without the payload.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ArtifactInfo {
    pub file_name: String,
    pub media_type: &'static str,
    pub size: usize,
}

impl DownloadArtifact {
    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            file_name: self.file_name.to_owned(),
            media_type: self.media_type,
            size: self.bytes.len(),
        }
    }
}

/// Replaces the trailing extension of `name` with the target's, or appends one.
pub fn output_file_name(name: &str, target: ConversionTarget) -> String {
    let extension = extension_of(name);
    let stem = &name[..name.len() - extension.len()];
    format!("{stem}{}", target.extension())
}

/// Serializes `table` in the target format. The row index is never written.
pub fn convert(table: &Table, source_name: &str, target: ConversionTarget) -> Result<DownloadArtifact, SweeperError> {
    let bytes = match target {
        ConversionTarget::Csv => spreadsheet::csv::write_table(table)?,
        ConversionTarget::Spreadsheet => spreadsheet::xlsx_writer::write_table(table)?,
    };
    let artifact = DownloadArtifact {
        file_name: output_file_name(source_name, target),
        media_type: target.media_type(),
        bytes: bytes.into(),
    };
    info!(
        file = %source_name,
        output = %artifact.file_name,
        size = artifact.bytes.len(),
        "converted to {target}"
    );
    Ok(artifact)
}
