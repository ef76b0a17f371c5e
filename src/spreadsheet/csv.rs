//! Comma-separated text: reading with type inference and writing.
use crate::error::SweeperError;
use crate::helpers::encoding::decode_text;
use crate::spreadsheet::SpreadsheetError;
use crate::table::unique_column_names;
use crate::table::Column;
use crate::table::ColumnType;
use crate::table::Table;
use crate::table::Value;
use csv::ReaderBuilder;
use csv::StringRecord;
use csv::Terminator;
use csv::WriterBuilder;
use tracing::debug;

/// Reads comma-separated bytes into a table.
///
/// The first record is the header. Shorter records are padded with missing values,
/// longer ones are rejected. Blank lines are skipped.
pub fn read_table(bytes: &[u8]) -> Result<Table, SweeperError> {
    let (text, encoding) = decode_text(bytes);
    debug!(encoding = encoding.name(), bytes = bytes.len(), "decoded comma-separated input");

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut records = reader.records();
    let header = match records.next() {
        Some(record) => record?,
        None => Err(SpreadsheetError::EmptyFile)?,
    };
    let names = unique_column_names(header.iter().map(str::to_owned).collect());
    let width = names.len();

    let mut fields: Vec<StringRecord> = Vec::new();
    for record in records {
        let record = record?;
        if record.len() > width {
            let line = record.position().map(|position| position.line()).unwrap_or_default();
            Err(SpreadsheetError::RaggedRow {
                line,
                expected: width,
                found: record.len(),
            })?
        }
        fields.push(record);
    }

    let columns: Vec<Column> = names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let kind = ColumnType::detect(
                fields
                    .iter()
                    .map(|record| record.get(index).and_then(ColumnType::from_text)),
            );
            Column { name, kind }
        })
        .collect();

    let rows = fields
        .iter()
        .map(|record| {
            columns
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    record
                        .get(index)
                        .map(|field| column.kind.parse_text(field))
                        .unwrap_or(Value::Null)
                })
                .collect()
        })
        .collect();

    Ok(Table::new(columns, rows)?)
}

/// Writes a table as comma-separated text with a header row and no index column.
/// Missing values become empty fields.
pub fn write_table(table: &Table) -> Result<Vec<u8>, SweeperError> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(table.columns().iter().map(|column| column.name.as_str()))?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|value| value.to_string()))?;
    }
    let bytes = writer.into_inner().map_err(|error| error.into_error())?;
    Ok(bytes)
}
