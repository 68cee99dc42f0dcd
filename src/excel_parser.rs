use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use log::{debug, info};
use serde::Serialize;
use serde_json::json;

use crate::chart_spec::ChartType;
use crate::error::ParseError;

pub const DEFAULT_TITLE: &str = "Grafiek";
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;
const VALID_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];

/// Cell content as far as chart extraction cares.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Cell {
    fn is_text(&self) -> bool {
        matches!(self, Cell::Text(_))
    }

    fn as_label(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Text(s) => s.trim().to_string(),
            Cell::Number(n) => n.to_string(),
            Cell::Bool(b) => b.to_string(),
        }
    }

    fn as_value(&self) -> Option<f64> {
        let value = match self {
            Cell::Number(n) => *n,
            Cell::Text(s) => s.trim().parse::<f64>().ok()?,
            Cell::Empty | Cell::Bool(_) => return None,
        };
        value.is_finite().then_some(value)
    }
}

impl From<&Data> for Cell {
    fn from(data: &Data) -> Self {
        match data {
            Data::Empty => Cell::Empty,
            Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
            Data::Int(i) => Cell::Number(*i as f64),
            Data::Float(f) => Cell::Number(*f),
            Data::Bool(b) => Cell::Bool(*b),
            Data::DateTime(dt) => Cell::Number(dt.as_f64()),
            Data::Error(_) => Cell::Empty,
        }
    }
}

/// Labels, values and a title pulled from the first sheet of a workbook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetData {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
    pub title: String,
}

impl SheetData {
    /// JSON block handed to the model inside `<excel_data>`.
    pub fn to_prompt_fragment(&self, chart_type: ChartType) -> String {
        json!({
            "labels": self.labels,
            "values": self.values,
            "title": self.title,
            "chartType": chart_type,
        })
        .to_string()
    }
}

/// Reads `.xlsx`/`.xls` workbooks into chart data.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExcelParser;

impl ExcelParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<SheetData, ParseError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Parsing spreadsheet {} ({} bytes)", path.display(), bytes.len());
        self.parse_buffer(&bytes)
    }

    pub fn parse_buffer(&self, bytes: &[u8]) -> Result<SheetData, ParseError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| ParseError::Workbook(e.to_string()))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(ParseError::NoSheets)?;
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| ParseError::Workbook(e.to_string()))?;

        let rows: Vec<Vec<Cell>> = range
            .rows()
            .map(|row| row.iter().map(Cell::from).collect())
            .collect();
        debug!("Sheet '{}' has {} rows", sheet_name, rows.len());

        extract_rows(&rows, Some(&sheet_name))
    }
}

/// Turn raw sheet rows into labels and values.
///
/// Row 0 is a header when its first two cells are both text. Rows whose label
/// is empty or whose value is not a finite number are skipped.
pub fn extract_rows(rows: &[Vec<Cell>], sheet_name: Option<&str>) -> Result<SheetData, ParseError> {
    if rows.len() < 2 {
        return Err(ParseError::TooFewRows);
    }

    let has_header = matches!(rows[0].as_slice(), [first, second, ..] if first.is_text() && second.is_text());
    let start = if has_header { 1 } else { 0 };

    let mut labels = Vec::new();
    let mut values = Vec::new();
    for row in &rows[start..] {
        if let [label_cell, value_cell, ..] = row.as_slice() {
            let label = label_cell.as_label();
            match value_cell.as_value() {
                Some(value) if !label.is_empty() => {
                    labels.push(label);
                    values.push(value);
                }
                _ => {}
            }
        }
    }

    if labels.is_empty() {
        return Err(ParseError::NoValidData);
    }

    let title = sheet_name
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_string();

    Ok(SheetData {
        labels,
        values,
        title,
    })
}

/// Reject uploads by name and size before any parsing happens.
pub fn validate_upload(file_name: &str, size_bytes: u64, limit: u64) -> Result<(), ParseError> {
    if !is_valid_excel_file(file_name) {
        return Err(ParseError::UnsupportedFileType);
    }
    if size_bytes > limit {
        return Err(ParseError::FileTooLarge {
            size: size_bytes,
            limit,
        });
    }
    Ok(())
}

pub fn is_valid_excel_file(file_name: &str) -> bool {
    let lower = file_name.to_lowercase();
    VALID_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn test_header_row_is_skipped() {
        let rows = vec![
            vec![text("Month"), text("Sales")],
            vec![text("Jan"), Cell::Number(100.0)],
            vec![text("Feb"), Cell::Number(150.0)],
        ];
        let data = extract_rows(&rows, Some("Verkoop")).unwrap();
        assert_eq!(data.labels, vec!["Jan", "Feb"]);
        assert_eq!(data.values, vec![100.0, 150.0]);
        assert_eq!(data.title, "Verkoop");
    }

    #[test]
    fn test_numeric_first_row_is_data() {
        let rows = vec![
            vec![Cell::Number(2020.0), Cell::Number(25.0)],
            vec![Cell::Number(2021.0), Cell::Number(26.5)],
        ];
        let data = extract_rows(&rows, None).unwrap();
        assert_eq!(data.labels, vec!["2020", "2021"]);
        assert_eq!(data.values, vec![25.0, 26.5]);
        assert_eq!(data.title, DEFAULT_TITLE);
    }

    #[test]
    fn test_invalid_rows_are_dropped() {
        let rows = vec![
            vec![text("Dag"), text("Check-ins")],
            vec![text("Maandag"), text("4.1")],
            vec![text(""), Cell::Number(3.0)],
            vec![text("Dinsdag"), text("veel")],
            vec![text("Woensdag")],
            vec![Cell::Empty, Cell::Empty],
            vec![text("Donderdag"), Cell::Number(4.7)],
        ];
        let data = extract_rows(&rows, Some("OV")).unwrap();
        assert_eq!(data.labels, vec!["Maandag", "Donderdag"]);
        assert_eq!(data.values, vec![4.1, 4.7]);
    }

    #[test]
    fn test_single_row_is_rejected() {
        let rows = vec![vec![text("Jan"), Cell::Number(1.0)]];
        assert!(matches!(extract_rows(&rows, None), Err(ParseError::TooFewRows)));
    }

    #[test]
    fn test_no_valid_rows_is_rejected() {
        let rows = vec![
            vec![text("Month"), text("Sales")],
            vec![text("Jan"), text("n.v.t.")],
        ];
        assert!(matches!(extract_rows(&rows, None), Err(ParseError::NoValidData)));
    }

    #[test]
    fn test_validate_upload() {
        assert!(validate_upload("data.xlsx", 1024, MAX_UPLOAD_BYTES).is_ok());
        assert!(validate_upload("DATA.XLS", 1024, MAX_UPLOAD_BYTES).is_ok());
        assert!(matches!(
            validate_upload("data.csv", 10, MAX_UPLOAD_BYTES),
            Err(ParseError::UnsupportedFileType)
        ));
        assert!(matches!(
            validate_upload("big.xlsx", MAX_UPLOAD_BYTES + 1, MAX_UPLOAD_BYTES),
            Err(ParseError::FileTooLarge { .. })
        ));
        assert!(validate_upload("small.xlsx", 2048, 1024).is_err());
        assert_eq!(
            ParseError::UnsupportedFileType.to_string(),
            "Ongeldig bestandstype. Alleen .xlsx en .xls bestanden zijn toegestaan."
        );
    }

    #[test]
    fn test_prompt_fragment() {
        let data = SheetData {
            labels: vec!["Jan".to_string()],
            values: vec![1.5],
            title: "Blad1".to_string(),
        };
        let fragment: serde_json::Value =
            serde_json::from_str(&data.to_prompt_fragment(ChartType::Bar)).unwrap();
        assert_eq!(fragment["chartType"], "bar");
        assert_eq!(fragment["labels"][0], "Jan");
        assert_eq!(fragment["title"], "Blad1");
    }

    fn workbook_bytes(sheet_name: &str, rows: &[(&str, f64)]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(sheet_name).unwrap();
        sheet.write_string(0, 0, "Month").unwrap();
        sheet.write_string(0, 1, "Sales").unwrap();
        for (i, (label, value)) in rows.iter().enumerate() {
            let row = i as u32 + 1;
            sheet.write_string(row, 0, *label).unwrap();
            sheet.write_number(row, 1, *value).unwrap();
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_parse_buffer_reads_first_sheet() {
        let bytes = workbook_bytes("Omzet", &[("Jan", 100.0), ("Feb", 150.0)]);
        let data = ExcelParser::new().parse_buffer(&bytes).unwrap();
        assert_eq!(data.labels, vec!["Jan", "Feb"]);
        assert_eq!(data.values, vec![100.0, 150.0]);
        assert_eq!(data.title, "Omzet");
    }

    #[test]
    fn test_parse_buffer_is_idempotent() {
        let bytes = workbook_bytes("Omzet", &[("Q1", 1.0), ("Q2", 2.0), ("Q3", 3.5)]);
        let parser = ExcelParser::new();
        assert_eq!(parser.parse_buffer(&bytes).unwrap(), parser.parse_buffer(&bytes).unwrap());
    }

    #[test]
    fn test_parse_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("omzet.xlsx");
        std::fs::write(&path, workbook_bytes("Blad1", &[("Jan", 5.0), ("Feb", 7.0)])).unwrap();
        let data = ExcelParser::new().parse_file(&path).unwrap();
        assert_eq!(data.values, vec![5.0, 7.0]);
    }

    #[test]
    fn test_parse_garbage_buffer_fails() {
        assert!(matches!(
            ExcelParser::new().parse_buffer(b"not a workbook"),
            Err(ParseError::Workbook(_))
        ));
    }
}
