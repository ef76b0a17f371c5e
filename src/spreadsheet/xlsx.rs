use crate::error::SweeperError;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::reference::index_to_reference;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SpreadsheetError;
use crate::table::Table;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::borrow::Cow;
use std::collections::HashMap;
use std::io::BufRead;
use std::io::Cursor;
use tracing::debug;
use zip::ZipArchive;

// XML tag names for parsing Excel XLSX format
const TAG_RELATIONSHIP: &[u8] = b"Relationship";          // Package relationship
const TAG_CUSTOM_FORMATS: QName = QName(b"numFmts");      // Custom number formats container
const TAG_CUSTOM_FORMAT: QName = QName(b"numFmt");        // Individual custom number format
const TAG_FORMAT_INDEXES: QName = QName(b"cellXfs");      // Cell format indexes container
const TAG_FORMAT_INDEX: QName = QName(b"xf");             // Individual cell format index
const TAG_SHARED_STRING_ITEM: QName = QName(b"si");       // Shared string table item
const TAG_PHONETIC_TEXT: QName = QName(b"rPh");           // Phonetic text for Asian languages
const TAG_TEXT: QName = QName(b"t");                      // Text content within strings
const TAG_WORKBOOK_PROPERTIES: QName = QName(b"workbookPr"); // Workbook properties
const TAG_SHEET: QName = QName(b"sheet");                 // Worksheet definition
const TAG_ROW: QName = QName(b"row");                     // Row in worksheet
const TAG_CELL: QName = QName(b"c");                      // Cell in worksheet
const TAG_INLINE_STRING: QName = QName(b"is");            // Inline string value
const TAG_VALUE: QName = QName(b"v");                     // Cell value content

/// Leading bytes of a compound file; encrypted workbooks are stored in one.
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

type Package<'a> = ZipArchive<Cursor<&'a [u8]>>;

/// An opened `.xlsx` package with the parts needed to read cell values
struct XlsxWorkbook<'a> {
    zip: Package<'a>,
    /// Parsed number formats for cell type detection, indexed by style ID
    number_formats: Vec<CellType>,
    shared_strings: Vec<String>,
    /// List of worksheets with (name, zip_path) pairs
    sheets: Vec<(String, String)>,
}

/// Reads the first worksheet of a workbook into a table.
/// Any failure to read the package is reported as an invalid workbook.
pub fn read_table(bytes: &[u8]) -> Result<Table, SweeperError> {
    read_first_sheet(bytes)
        .and_then(|sheet| Ok(sheet.into_table()?))
        .map_err(|error| match error {
            SweeperError::SpreadsheetError(error) => SweeperError::SpreadsheetError(error),
            error => SpreadsheetError::InvalidWorkbook(error.to_string()).into(),
        })
}

fn read_first_sheet(bytes: &[u8]) -> Result<Sheet, SweeperError> {
    if bytes.starts_with(&CFB_SIGNATURE) {
        Err(SpreadsheetError::InvalidWorkbook(
            "password-protected or legacy binary workbooks are not supported".to_owned(),
        ))?
    }
    let mut workbook = XlsxWorkbook::open(bytes)?;
    workbook.read_sheet(0)
}

impl<'a> XlsxWorkbook<'a> {
    fn open(bytes: &'a [u8]) -> Result<XlsxWorkbook<'a>, SweeperError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let (sheets, is_1904) = load_workbook(&mut zip)?;
        if sheets.is_empty() {
            Err(SpreadsheetError::InvalidWorkbook("workbook contains no worksheets".to_owned()))?
        }
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        let shared_strings = load_shared_strings(&mut zip)?;
        debug!(
            sheets = sheets.len(),
            shared_strings = shared_strings.len(),
            is_1904,
            "opened workbook"
        );
        Ok(XlsxWorkbook {
            zip,
            number_formats,
            shared_strings,
            sheets,
        })
    }

    /// Reads every non-empty cell of the worksheet at `index`.
    fn read_sheet(&mut self, index: usize) -> Result<Sheet, SweeperError> {
        let (sheet_name, zip_path) = self.sheets.get(index).ok_or_else(|| {
            SpreadsheetError::InvalidWorkbook(format!("worksheet #{index} does not exist"))
        })?;
        let mut reader = self.zip.xml_reader(zip_path)?.ok_or_else(|| {
            SpreadsheetError::InvalidWorkbook(format!("missing part '{zip_path}' for sheet '{sheet_name}'"))
        })?;

        let mut sheet = Sheet::new(sheet_name);
        let mut row_count = 0usize;
        let mut col_count = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut is_shared = false;
        let mut value = String::new();
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TAG_ROW => {
                if let Some(number) = event.parse_attribute_value::<usize>("r")? {
                    row_count = number.saturating_sub(1);
                }
                col_count = 0;
            }
            Event::End(event) if event.name() == TAG_ROW => {
                row_count += 1;
            }
            Event::Start(event) if event.name() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row_count, col_count));
                col_count = col + 1;
                value.clear();
                is_shared = false;
                kind = match event.get_attribute_value("t")?.as_deref() {
                    Some("s") => {
                        is_shared = true;
                        CellType::Text
                    }
                    Some("inlineStr") | Some("str") => CellType::Text,
                    Some("d") => CellType::IsoDateTime,
                    Some("b") => CellType::Boolean,
                    Some("e") => CellType::Error,
                    _ => CellType::Number,
                };
                if kind == CellType::Number {
                    if let Some(format_id) = event.get_attribute_value("s")?.filter(|id| !id.is_empty()) {
                        let index = format_id.parse::<usize>()?;
                        kind = self.number_formats.get(index).copied().unwrap_or(CellType::Number);
                    }
                }
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if kind != CellType::Empty && event.name() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if event.name() == TAG_CELL => {
                if is_shared {
                    value = value.trim().parse::<usize>().ok()
                        .and_then(|index| self.shared_strings.get(index))
                        .cloned()
                        .ok_or_else(|| SpreadsheetError::InvalidWorkbook(format!(
                            "invalid shared string index '{}' at {}",
                            value,
                            index_to_reference(row, col),
                        )))?;
                }
                if kind != CellType::Empty && !value.is_empty() {
                    sheet.push(Cell {
                        row,
                        col,
                        kind,
                        value: std::mem::take(&mut value),
                    });
                }
                kind = CellType::Empty;
                is_shared = false;
            }
        });
        debug!(sheet = %sheet.name, cells = sheet.cells.len(), "read worksheet");
        Ok(sheet)
    }
}

/// Loads the shared string table; a workbook without one has no shared strings.
fn load_shared_strings(zip: &mut Package<'_>) -> Result<Vec<String>, SweeperError> {
    let mut shared_strings = Vec::<String>::new();
    let mut reader = match zip.xml_reader("xl/sharedStrings.xml")? {
        Some(reader) => reader,
        None => return Ok(shared_strings),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHARED_STRING_ITEM => {
            let string = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            shared_strings.push(string);
        }
    });
    Ok(shared_strings)
}

/// Loads worksheet names and paths in workbook order, and whether the 1904 date
/// system is in use.
fn load_workbook(zip: &mut Package<'_>) -> Result<(Vec<(String, String)>, bool), SweeperError> {
    let relationships = load_relationships(zip, "xl/_rels/workbook.xml.rels")?;
    let mut reader = zip.xml_reader("xl/workbook.xml")?
        .ok_or_else(|| SpreadsheetError::InvalidWorkbook("missing part 'xl/workbook.xml'".to_owned()))?;
    let mut sheets: Vec<(String, String)> = Vec::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                let key = attribute.key.local_name();
                if key.as_ref() == b"name" {
                    name = Some(attribute.get_value()?);
                } else if key.as_ref() == b"id" {
                    id = Some(attribute.get_value()?);
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(id.as_ref()) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.name() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value.eq("1") || value.eq("true"))
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Maps relationship IDs to worksheet paths within the package
fn load_relationships(zip: &mut Package<'_>, path: &str) -> Result<HashMap<String, String>, SweeperError> {
    let mut reader = zip.xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::InvalidWorkbook(format!("missing part '{path}'")))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            // Only process worksheet relationships
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Loads cell styles from `xl/styles.xml` and classifies each one by its number
/// format, so that numbers formatted as dates or times can be recognised.
fn load_number_formats(zip: &mut Package<'_>, is_1904: bool) -> Result<Vec<CellType>, SweeperError> {
    let mut reader = match zip.xml_reader("xl/styles.xml")? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut has_custom_formats = false;
    let mut custom_formats_context = false;
    let mut custom_formats = HashMap::<String, CellType>::new();

    let mut has_format_indexes = false;
    let mut format_indexes_context = false;
    let mut format_indexes = Vec::<String>::new();

    match_xml_events!(reader => {
        Event::Start(event) if !custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            has_custom_formats = true;
            custom_formats_context = true;
        }
        Event::End(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMATS => {
            custom_formats_context = false;
            if has_custom_formats && has_format_indexes {
                break;
            }
        }
        Event::Start(event) if custom_formats_context && event.name() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                let style = CellType::parse_custom_number_format(&format, is_1904);
                custom_formats.insert(id.to_string(), style);
            }
        }

        Event::Start(event) if !format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            has_format_indexes = true;
            format_indexes_context = true;
        }
        Event::End(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEXES => {
            format_indexes_context = false;
            if has_custom_formats && has_format_indexes {
                break;
            }
        }
        Event::Start(event) if format_indexes_context && event.name() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.unwrap_or(Cow::Borrowed("0"));
            format_indexes.push(id.to_string());
        }
    });

    let number_formats = format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect();
    Ok(number_formats)
}

/// Normalizes a relationship target to a path inside the package
fn to_zip_path(path: &str) -> String {
    if let Some(path) = path.strip_prefix('/') {
        path.to_string()
    } else if path.starts_with("xl/") {
        path.to_string()
    } else {
        format!("xl/{path}")
    }
}

/// Reads string content up to `end_tag`, skipping phonetic annotations.
/// With `is_text_content` the element's own text is the value (as in `<v>`),
/// otherwise only `<t>` runs are collected (as in `<si>` and `<is>`).
fn read_string_value<R: BufRead>(
    reader: &mut XmlReader<R>,
    end_tag: QName,
    is_text_content: bool,
) -> Result<String, SweeperError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.name() == end_tag => break,
        Event::Start(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.name() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.name() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.name() == TAG_TEXT => is_text = false,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helpers::zip::ZipWriterHelper;
    use crate::table::ColumnType;
    use crate::table::Value;
    use chrono::NaiveDate;
    use zip::ZipWriter;

    const WORKBOOK: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<workbookPr date1904="false"/>
<sheets><sheet name="Data" sheetId="1" r:id="rId1"/><sheet name="Other" sheetId="2" r:id="rId2"/></sheets>
</workbook>"#;

    const RELATIONSHIPS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="/xl/worksheets/sheet2.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

    const STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="1"><numFmt numFmtId="164" formatCode="yyyy\-mm\-dd"/></numFmts>
<cellStyleXfs count="1"><xf numFmtId="0"/></cellStyleXfs>
<cellXfs count="3"><xf numFmtId="0"/><xf numFmtId="164"/><xf numFmtId="2"/></cellXfs>
</styleSheet>"#;

    const SHARED_STRINGS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<si><t>name</t></si>
<si><r><t>sc</t></r><r><t>ore</t></r></si>
<si><t>when</t></si>
<si><t>Tom &amp; Co</t><rPh><t>ignored</t></rPh></si>
</sst>"#;

    const SHEET1: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<sheetData>
<row r="2"><c r="B2" t="s"><v>0</v></c><c r="C2" t="s"><v>1</v></c><c r="D2" t="s"><v>2</v></c><c r="E2" t="inlineStr"><is><t>ok</t></is></c></row>
<row r="3"><c r="B3" t="s"><v>3</v></c><c r="C3" s="2"><v>1.5</v></c><c r="D3" s="1"><v>45292</v></c><c r="E3" t="b"><v>1</v></c></row>
<row r="4"><c r="B4" t="str"><f>A1</f><v>x</v></c><c r="C4"><v>2</v></c><c r="D4" t="e"><v>#N/A</v></c><c r="E4" t="b"><v>0</v></c></row>
</sheetData>
</worksheet>"#;

    fn package(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in parts {
            writer.part(name, content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn sample() -> Vec<u8> {
        package(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELATIONSHIPS),
            ("xl/styles.xml", STYLES),
            ("xl/sharedStrings.xml", SHARED_STRINGS),
            ("xl/worksheets/sheet1.xml", SHEET1),
            ("xl/worksheets/sheet2.xml", "<worksheet><sheetData/></worksheet>"),
        ])
    }

    #[test]
    fn workbook_structure() {
        let bytes = sample();
        let workbook = XlsxWorkbook::open(&bytes).unwrap();
        assert_eq!(
            workbook.sheets,
            vec![
                ("Data".to_owned(), "xl/worksheets/sheet1.xml".to_owned()),
                ("Other".to_owned(), "xl/worksheets/sheet2.xml".to_owned()),
            ]
        );
        assert_eq!(
            workbook.number_formats,
            vec![CellType::Number, CellType::NumberDate1900, CellType::Number]
        );
        assert_eq!(workbook.shared_strings, vec!["name", "score", "when", "Tom & Co"]);
    }

    #[test]
    fn reads_first_sheet() {
        let table = read_table(&sample()).unwrap();
        assert_eq!(table.column_names(), vec!["name", "score", "when", "ok"]);
        assert_eq!(
            table.columns().iter().map(|column| column.kind).collect::<Vec<_>>(),
            vec![ColumnType::Varchar, ColumnType::Double, ColumnType::Date, ColumnType::Boolean]
        );
        assert_eq!(
            table.rows()[0],
            vec![
                Value::Text("Tom & Co".to_owned()),
                Value::Float(1.5),
                Value::Date(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
                Value::Boolean(true),
            ]
        );
        assert_eq!(
            table.rows()[1],
            vec![Value::Text("x".to_owned()), Value::Float(2.0), Value::Null, Value::Boolean(false)]
        );
    }

    #[test]
    fn cells_without_references_follow_document_order() {
        let sheet = r#"<worksheet><sheetData>
<row><c t="inlineStr"><is><t>a</t></is></c><c t="inlineStr"><is><t>b</t></is></c></row>
<row><c><v>1</v></c><c><v>2</v></c></row>
</sheetData></worksheet>"#;
        let bytes = package(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELATIONSHIPS),
            ("xl/worksheets/sheet1.xml", sheet),
        ]);
        let table = read_table(&bytes).unwrap();
        assert_eq!(table.column_names(), vec!["a", "b"]);
        assert_eq!(table.rows(), &[vec![Value::Int(1), Value::Int(2)]]);
    }

    #[test]
    fn empty_sheet_has_no_header() {
        let bytes = package(&[
            ("xl/workbook.xml", WORKBOOK),
            ("xl/_rels/workbook.xml.rels", RELATIONSHIPS),
            ("xl/worksheets/sheet1.xml", "<worksheet><sheetData/></worksheet>"),
        ]);
        assert!(matches!(
            read_table(&bytes).unwrap_err(),
            SweeperError::SpreadsheetError(SpreadsheetError::EmptyFile)
        ));
    }

    #[test]
    fn rejects_invalid_packages() {
        for bytes in [
            b"not a zip archive".to_vec(),
            [CFB_SIGNATURE.to_vec(), vec![0u8; 504]].concat(),
            package(&[("xl/workbook.xml", WORKBOOK)]),
        ] {
            assert!(matches!(
                read_table(&bytes).unwrap_err(),
                SweeperError::SpreadsheetError(SpreadsheetError::InvalidWorkbook(_))
            ));
        }
    }

    #[test]
    fn zip_paths() {
        assert_eq!(to_zip_path("worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path("/xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
        assert_eq!(to_zip_path("xl/worksheets/sheet1.xml"), "xl/worksheets/sheet1.xml");
    }
}
