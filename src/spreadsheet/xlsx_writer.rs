//! Writes a table as a single-sheet `.xlsx` workbook.
use crate::error::SweeperError;
use crate::helpers::xml::XmlWriter;
use crate::helpers::zip::ZipWriterHelper;
use crate::spreadsheet::cell::time_to_serial;
use crate::spreadsheet::cell::to_serial;
use crate::spreadsheet::reference::index_to_reference;
use crate::table::value::format_float;
use crate::table::Table;
use crate::table::Value;
use std::io::Cursor;
use zip::ZipWriter;

const NS_MAIN: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
const NS_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PACKAGE_RELATIONSHIPS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const NS_CONTENT_TYPES: &str = "http://schemas.openxmlformats.org/package/2006/content-types";

const SHEET_NAME: &str = "Sheet1";

/// Cell style indexes written to `cellXfs`
const STYLE_DATE: &str = "1";
const STYLE_TIME: &str = "2";
const STYLE_DATETIME: &str = "3";

/// Custom number formats as (numFmtId, formatCode)
const NUMBER_FORMATS: [(&str, &str); 3] = [
    ("164", "yyyy-mm-dd"),
    ("165", "hh:mm:ss"),
    ("166", "yyyy-mm-dd hh:mm:ss"),
];

/// Serializes a table into an in-memory workbook with one worksheet named `Sheet1`.
/// The header is the first row; missing values leave their cell out.
pub fn write_table(table: &Table) -> Result<Vec<u8>, SweeperError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    zip.part("[Content_Types].xml", &content_types()?)?;
    zip.part("_rels/.rels", &package_relationships()?)?;
    zip.part("xl/workbook.xml", &workbook()?)?;
    zip.part("xl/_rels/workbook.xml.rels", &workbook_relationships()?)?;
    zip.part("xl/styles.xml", &styles()?)?;
    zip.part("xl/worksheets/sheet1.xml", &worksheet(table)?)?;
    Ok(zip.finish()?.into_inner())
}

fn content_types() -> Result<Vec<u8>, SweeperError> {
    let mut xml = XmlWriter::new()?;
    xml.start("Types", &[("xmlns", NS_CONTENT_TYPES)])?;
    xml.empty("Default", &[
        ("Extension", "rels"),
        ("ContentType", "application/vnd.openxmlformats-package.relationships+xml"),
    ])?;
    xml.empty("Default", &[("Extension", "xml"), ("ContentType", "application/xml")])?;
    xml.empty("Override", &[
        ("PartName", "/xl/workbook.xml"),
        ("ContentType", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"),
    ])?;
    xml.empty("Override", &[
        ("PartName", "/xl/worksheets/sheet1.xml"),
        ("ContentType", "application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"),
    ])?;
    xml.empty("Override", &[
        ("PartName", "/xl/styles.xml"),
        ("ContentType", "application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"),
    ])?;
    xml.end("Types")?;
    Ok(xml.into_inner())
}

fn package_relationships() -> Result<Vec<u8>, SweeperError> {
    let mut xml = XmlWriter::new()?;
    xml.start("Relationships", &[("xmlns", NS_PACKAGE_RELATIONSHIPS)])?;
    xml.empty("Relationship", &[
        ("Id", "rId1"),
        ("Type", "http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument"),
        ("Target", "xl/workbook.xml"),
    ])?;
    xml.end("Relationships")?;
    Ok(xml.into_inner())
}

fn workbook() -> Result<Vec<u8>, SweeperError> {
    let mut xml = XmlWriter::new()?;
    xml.start("workbook", &[("xmlns", NS_MAIN), ("xmlns:r", NS_RELATIONSHIPS)])?;
    xml.start("sheets", &[])?;
    xml.empty("sheet", &[("name", SHEET_NAME), ("sheetId", "1"), ("r:id", "rId1")])?;
    xml.end("sheets")?;
    xml.end("workbook")?;
    Ok(xml.into_inner())
}

fn workbook_relationships() -> Result<Vec<u8>, SweeperError> {
    let mut xml = XmlWriter::new()?;
    xml.start("Relationships", &[("xmlns", NS_PACKAGE_RELATIONSHIPS)])?;
    xml.empty("Relationship", &[
        ("Id", "rId1"),
        ("Type", "http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet"),
        ("Target", "worksheets/sheet1.xml"),
    ])?;
    xml.empty("Relationship", &[
        ("Id", "rId2"),
        ("Type", "http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles"),
        ("Target", "styles.xml"),
    ])?;
    xml.end("Relationships")?;
    Ok(xml.into_inner())
}

fn styles() -> Result<Vec<u8>, SweeperError> {
    let mut xml = XmlWriter::new()?;
    xml.start("styleSheet", &[("xmlns", NS_MAIN)])?;

    let count = NUMBER_FORMATS.len().to_string();
    xml.start("numFmts", &[("count", count.as_str())])?;
    for (id, code) in NUMBER_FORMATS {
        xml.empty("numFmt", &[("numFmtId", id), ("formatCode", code)])?;
    }
    xml.end("numFmts")?;

    xml.start("fonts", &[("count", "1")])?;
    xml.start("font", &[])?;
    xml.empty("sz", &[("val", "11")])?;
    xml.empty("name", &[("val", "Calibri")])?;
    xml.end("font")?;
    xml.end("fonts")?;

    xml.start("fills", &[("count", "2")])?;
    for pattern in ["none", "gray125"] {
        xml.start("fill", &[])?;
        xml.empty("patternFill", &[("patternType", pattern)])?;
        xml.end("fill")?;
    }
    xml.end("fills")?;

    xml.start("borders", &[("count", "1")])?;
    xml.start("border", &[])?;
    for side in ["left", "right", "top", "bottom", "diagonal"] {
        xml.empty(side, &[])?;
    }
    xml.end("border")?;
    xml.end("borders")?;

    let base = [("fontId", "0"), ("fillId", "0"), ("borderId", "0")];
    let format = |id: &'static str| std::iter::once(("numFmtId", id)).chain(base);
    xml.start("cellStyleXfs", &[("count", "1")])?;
    xml.empty("xf", &format("0").collect::<Vec<_>>())?;
    xml.end("cellStyleXfs")?;

    // Style 0 is the default; 1..=3 follow NUMBER_FORMATS.
    let count = (NUMBER_FORMATS.len() + 1).to_string();
    xml.start("cellXfs", &[("count", count.as_str())])?;
    xml.empty("xf", &format("0").chain([("xfId", "0")]).collect::<Vec<_>>())?;
    for (id, _) in NUMBER_FORMATS {
        let attributes: Vec<(&str, &str)> = format(id)
            .chain([("xfId", "0"), ("applyNumberFormat", "1")])
            .collect();
        xml.empty("xf", &attributes)?;
    }
    xml.end("cellXfs")?;

    xml.start("cellStyles", &[("count", "1")])?;
    xml.empty("cellStyle", &[("name", "Normal"), ("xfId", "0"), ("builtinId", "0")])?;
    xml.end("cellStyles")?;

    xml.end("styleSheet")?;
    Ok(xml.into_inner())
}

fn worksheet(table: &Table) -> Result<Vec<u8>, SweeperError> {
    let mut xml = XmlWriter::new()?;
    xml.start("worksheet", &[("xmlns", NS_MAIN)])?;
    xml.start("sheetData", &[])?;
    if table.width() > 0 {
        let header = table.columns().iter().map(|column| Value::Text(column.name.to_owned()));
        write_row(&mut xml, 0, header)?;
        for (index, row) in table.rows().iter().enumerate() {
            write_row(&mut xml, index + 1, row.iter().cloned())?;
        }
    }
    xml.end("sheetData")?;
    xml.end("worksheet")?;
    Ok(xml.into_inner())
}

fn write_row(xml: &mut XmlWriter, row: usize, values: impl Iterator<Item = Value>) -> Result<(), SweeperError> {
    let number = (row + 1).to_string();
    xml.start("row", &[("r", number.as_str())])?;
    for (col, value) in values.enumerate() {
        write_cell(xml, &index_to_reference(row, col), &value)?;
    }
    xml.end("row")
}

fn write_cell(xml: &mut XmlWriter, reference: &str, value: &Value) -> Result<(), SweeperError> {
    match value {
        Value::Null => Ok(()),
        Value::Float(number) if number.is_nan() => Ok(()),
        Value::Boolean(flag) => {
            xml.start("c", &[("r", reference), ("t", "b")])?;
            xml.element("v", &[], if *flag { "1" } else { "0" })?;
            xml.end("c")
        }
        Value::Int(number) => number_cell(xml, reference, None, &number.to_string()),
        Value::Float(number) if number.is_finite() => number_cell(xml, reference, None, &format_float(*number)),
        Value::Timestamp(datetime) => serial_cell(xml, reference, STYLE_DATETIME, to_serial(*datetime), value),
        Value::Date(date) => {
            let serial = date.and_hms_opt(0, 0, 0).map(to_serial).unwrap_or(-1.0);
            serial_cell(xml, reference, STYLE_DATE, serial, value)
        }
        Value::Time(time) => serial_cell(xml, reference, STYLE_TIME, time_to_serial(*time), value),
        Value::Float(_) | Value::Text(_) => {
            xml.start("c", &[("r", reference), ("t", "inlineStr")])?;
            xml.start("is", &[])?;
            xml.element("t", &[("xml:space", "preserve")], &value.to_string())?;
            xml.end("is")?;
            xml.end("c")
        }
    }
}

fn number_cell(xml: &mut XmlWriter, reference: &str, style: Option<&str>, number: &str) -> Result<(), SweeperError> {
    match style {
        Some(style) => xml.start("c", &[("r", reference), ("s", style)])?,
        None => xml.start("c", &[("r", reference)])?,
    }
    xml.element("v", &[], number)?;
    xml.end("c")
}

/// Dates before the 1900 epoch have no serial number and are kept as text.
fn serial_cell(xml: &mut XmlWriter, reference: &str, style: &str, serial: f64, value: &Value) -> Result<(), SweeperError> {
    if serial >= 0.0 {
        number_cell(xml, reference, Some(style), &format_float(serial))
    } else {
        write_cell(xml, reference, &Value::Text(value.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::zip::ZipHelper;
    use crate::spreadsheet::xlsx::read_table;
    use crate::table::Column;
    use crate::table::ColumnType;
    use chrono::NaiveDate;
    use chrono::NaiveTime;
    use std::io::Read;
    use zip::ZipArchive;

    fn sample() -> Table {
        let date = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        Table::new(
            vec![
                Column::new("id", ColumnType::BigInt),
                Column::new("price", ColumnType::Double),
                Column::new("name", ColumnType::Varchar),
                Column::new("active", ColumnType::Boolean),
                Column::new("day", ColumnType::Date),
                Column::new("at", ColumnType::Timestamp),
                Column::new("clock", ColumnType::Time),
            ],
            vec![
                vec![
                    Value::Int(1),
                    Value::Float(2.5),
                    Value::Text(" a & b ".to_owned()),
                    Value::Boolean(true),
                    Value::Date(date),
                    Value::Timestamp(date.and_hms_opt(6, 30, 0).unwrap()),
                    Value::Time(NaiveTime::from_hms_opt(18, 0, 0).unwrap()),
                ],
                vec![
                    Value::Int(2),
                    Value::Float(3.0),
                    Value::Null,
                    Value::Boolean(false),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                ],
            ],
        )
        .unwrap()
    }

    #[test]
    fn writes_expected_parts() {
        let bytes = write_table(&sample()).unwrap();
        let mut zip = ZipArchive::new(Cursor::new(bytes)).unwrap();
        for part in [
            "[Content_Types].xml",
            "_rels/.rels",
            "xl/workbook.xml",
            "xl/_rels/workbook.xml.rels",
            "xl/styles.xml",
            "xl/worksheets/sheet1.xml",
        ] {
            assert!(zip.file(part).unwrap().is_some(), "{part}");
        }

        let mut sheet = String::new();
        zip.file("xl/worksheets/sheet1.xml").unwrap().unwrap().read_to_string(&mut sheet).unwrap();
        assert!(sheet.contains(r#"<c r="A1" t="inlineStr"><is><t xml:space="preserve">id</t></is></c>"#));
        assert!(sheet.contains(r#"<c r="B2"><v>2.5</v></c>"#));
        assert!(sheet.contains(r#"<c r="D3" t="b"><v>0</v></c>"#));
        assert!(sheet.contains(r#"<c r="G2" s="2"><v>0.75</v></c>"#));
        assert!(!sheet.contains(r#"r="C3""#));
    }

    #[test]
    fn round_trips_through_reader() {
        let table = sample();
        let again = read_table(&write_table(&table).unwrap()).unwrap();
        assert_eq!(again, table);
    }

    #[test]
    fn integral_floats_stay_floats() {
        let table = Table::new(
            vec![Column::new("x", ColumnType::Double)],
            vec![vec![Value::Float(3.0)], vec![Value::Float(1e20)]],
        )
        .unwrap();
        let again = read_table(&write_table(&table).unwrap()).unwrap();
        assert_eq!(again.columns()[0].kind, ColumnType::Double);
        assert_eq!(again.rows(), table.rows());
    }

    #[test]
    fn zero_columns_write_an_empty_sheet() {
        let table = Table::new(vec![], vec![vec![], vec![]]).unwrap();
        let bytes = write_table(&table).unwrap();
        assert!(ZipArchive::new(Cursor::new(bytes)).is_ok());
    }
}
