use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, info};

use crate::models::{CellValue, RawRow, Table};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to read table: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to read table: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to read workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("expected a JSON array of row objects")]
    NotRecords,

    #[error("workbook has no sheets")]
    NoSheets,
}

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Parses the textual date and timestamp layouts seen in exported sheets.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .map(|date| date.and_time(chrono::NaiveTime::MIN))
        })
}

fn looks_like_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match (chars.next(), chars.next()) {
        (Some('+'), _) => true,
        (Some('0'), Some(next)) => next.is_ascii_digit(),
        _ => false,
    }
}

/// Classifies one raw text cell.
pub fn infer_cell(raw: &str) -> CellValue {
    let text = raw.trim();
    if text.is_empty() {
        return CellValue::Missing;
    }

    if let Some(timestamp) = parse_timestamp(text) {
        return CellValue::Date(timestamp);
    }

    if !looks_like_identifier(text) {
        if let Ok(number) = text.parse::<f64>() {
            if number.is_finite() {
                return CellValue::Number(number);
            }
        }
    }

    CellValue::Text(raw.to_string())
}

pub fn read_csv_path(path: &Path) -> Result<Table, IngestError> {
    let reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let table = read_csv_records(reader)?;
    info!(path = %path.display(), rows = table.rows.len(), columns = table.columns.len(), "table ingested");
    Ok(table)
}

pub fn read_csv<R: Read>(input: R) -> Result<Table, IngestError> {
    let reader = csv::ReaderBuilder::new().flexible(true).from_reader(input);
    read_csv_records(reader)
}

fn read_csv_records<R: Read>(mut reader: csv::Reader<R>) -> Result<Table, IngestError> {
    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let cells = columns
            .iter()
            .enumerate()
            .map(|(index, column)| {
                let value = record.get(index).map(infer_cell).unwrap_or(CellValue::Missing);
                (column.clone(), value)
            })
            .collect();
        rows.push(RawRow::new(cells));
    }

    Ok(Table { columns, rows })
}

fn json_cell(value: &Value) -> CellValue {
    match value {
        Value::Null => CellValue::Missing,
        Value::Number(number) => number
            .as_f64()
            .map(CellValue::Number)
            .unwrap_or_else(|| CellValue::Text(number.to_string())),
        Value::String(text) => infer_cell(text),
        Value::Bool(flag) => CellValue::Text(flag.to_string()),
        other => CellValue::Text(other.to_string()),
    }
}

/// Reads `[{"Name": .., "Practice Task": ..}, ..]`. Columns are the union of
/// all keys; `serde_json` objects iterate their keys sorted, so that is the
/// column order.
pub fn from_json_records(value: &Value) -> Result<Table, IngestError> {
    let records = value.as_array().ok_or(IngestError::NotRecords)?;
    let mut columns: Vec<String> = Vec::new();

    for record in records {
        let object = record.as_object().ok_or(IngestError::NotRecords)?;
        for key in object.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }

    let rows = records
        .iter()
        .filter_map(Value::as_object)
        .map(|object| {
            let cells = columns
                .iter()
                .map(|column| {
                    let value = object.get(column).map(json_cell).unwrap_or(CellValue::Missing);
                    (column.clone(), value)
                })
                .collect();
            RawRow::new(cells)
        })
        .collect();

    Ok(Table { columns, rows })
}

pub fn from_json_str(input: &str) -> Result<Table, IngestError> {
    let value: Value = serde_json::from_str(input)?;
    from_json_records(&value)
}

fn workbook_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty => CellValue::Missing,
        Data::Int(value) => CellValue::Number(*value as f64),
        Data::Float(value) => CellValue::Number(*value),
        Data::String(text) => infer_cell(text),
        Data::Bool(flag) => CellValue::Text(flag.to_string()),
        Data::DateTime(value) => match value.as_datetime() {
            Some(timestamp) if value.is_datetime() => CellValue::Date(timestamp),
            _ => CellValue::Number(value.as_f64()),
        },
        Data::DateTimeIso(text) => parse_timestamp(text)
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::Text(text.clone())),
        Data::DurationIso(text) => CellValue::Text(text.clone()),
        Data::Error(err) => {
            debug!(error = ?err, "error cell in workbook");
            CellValue::Text(err.to_string())
        }
    }
}

/// Reads the first sheet of an Excel or OpenDocument workbook. The first row
/// holds the column names.
pub fn read_xlsx_path(path: &Path) -> Result<Table, IngestError> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(IngestError::NoSheets)?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows_iter = range.rows();
    let columns: Vec<String> = match rows_iter.next() {
        Some(header) => header.iter().map(|cell| cell.to_string().trim().to_string()).collect(),
        None => Vec::new(),
    };

    let rows: Vec<RawRow> = rows_iter
        .map(|row| {
            let cells = columns
                .iter()
                .enumerate()
                .map(|(index, column)| {
                    let value = row.get(index).map(workbook_cell).unwrap_or(CellValue::Missing);
                    (column.clone(), value)
                })
                .collect();
            RawRow::new(cells)
        })
        .collect();

    info!(path = %path.display(), sheet = %sheet, rows = rows.len(), columns = columns.len(), "workbook ingested");
    Ok(Table { columns, rows })
}

fn has_extension(path: &Path, candidates: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| candidates.iter().any(|candidate| ext.eq_ignore_ascii_case(candidate)))
        .unwrap_or(false)
}

/// Picks the reader from the file extension: workbooks, `.json` record
/// arrays, and CSV for everything else.
pub fn read_table_path(path: &Path) -> Result<Table, IngestError> {
    if has_extension(path, &WORKBOOK_EXTENSIONS) {
        read_xlsx_path(path)
    } else if has_extension(path, &["json"]) {
        let text = std::fs::read_to_string(path)?;
        from_json_str(&text)
    } else {
        read_csv_path(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_cell_kinds() {
        assert_eq!(infer_cell("  "), CellValue::Missing);
        assert_eq!(infer_cell("42"), CellValue::Number(42.0));
        assert_eq!(infer_cell("90%"), CellValue::text("90%"));
        assert_eq!(infer_cell("Done"), CellValue::text("Done"));
        assert!(matches!(infer_cell("2025-02-20"), CellValue::Date(_)));
        assert!(matches!(infer_cell("2025-02-20 14:05:00"), CellValue::Date(_)));
        assert_eq!(infer_cell("nan"), CellValue::text("nan"));
    }

    #[test]
    fn phone_numbers_stay_text() {
        assert_eq!(infer_cell("0712345678"), CellValue::text("0712345678"));
        assert_eq!(infer_cell("+40712345678"), CellValue::text("+40712345678"));
        assert_eq!(infer_cell("0.5"), CellValue::Number(0.5));
    }

    #[test]
    fn reads_csv_with_ragged_rows() {
        let input = "Name,Surname,Grade\nAna,Popa,7\nIon\n";
        let table = read_csv(input.as_bytes()).unwrap();
        assert_eq!(table.columns, vec!["Name", "Surname", "Grade"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].get("grade"), Some(&CellValue::Number(7.0)));
        assert_eq!(table.rows[1].get("Surname"), Some(&CellValue::Missing));
    }

    #[test]
    fn reads_json_records() {
        let value = json!([
            {"Name": "Ana", "Success/Progress Rate": 90},
            {"Name": "Ion", "Completion Date": "2025-02-21", "Practice Task": null}
        ]);
        let table = from_json_records(&value).unwrap();
        assert_eq!(table.columns.len(), 4);
        assert_eq!(table.rows[0].get("Success/Progress Rate"), Some(&CellValue::Number(90.0)));
        assert_eq!(table.rows[0].get("Completion Date"), Some(&CellValue::Missing));
        assert_eq!(table.rows[1].get("Practice Task"), Some(&CellValue::Missing));
    }

    #[test]
    fn workbook_cells_map_to_cell_values() {
        assert_eq!(workbook_cell(&Data::Empty), CellValue::Missing);
        assert_eq!(workbook_cell(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(workbook_cell(&Data::Float(90.5)), CellValue::Number(90.5));
        assert_eq!(workbook_cell(&Data::String("0712345678".to_string())), CellValue::text("0712345678"));
        assert_eq!(workbook_cell(&Data::String("90%".to_string())), CellValue::text("90%"));
        assert_eq!(workbook_cell(&Data::Bool(true)), CellValue::text("true"));
        assert_eq!(
            workbook_cell(&Data::DateTimeIso("2025-02-20T08:15:00".to_string())),
            CellValue::Date(
                NaiveDate::from_ymd_opt(2025, 2, 20)
                    .unwrap()
                    .and_hms_opt(8, 15, 0)
                    .unwrap()
            )
        );
    }

    #[test]
    fn json_files_are_picked_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.JSON");
        std::fs::write(&path, r#"[{"Name": "Ana", "Grade": 7}]"#).unwrap();

        let table = read_table_path(&path).unwrap();
        assert_eq!(table.columns, vec!["Grade", "Name"]);
        assert_eq!(table.rows[0].get("Grade"), Some(&CellValue::Number(7.0)));
    }

    #[test]
    fn other_extensions_read_as_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sheet.txt");
        std::fs::write(&path, "Name,Grade\nAna,7\n").unwrap();

        let table = read_table_path(&path).unwrap();
        assert_eq!(table.columns, vec!["Name", "Grade"]);
        assert!(matches!(
            read_table_path(&dir.path().join("missing.xlsx")),
            Err(IngestError::Workbook(_))
        ));
    }

    #[test]
    fn rejects_non_record_json() {
        assert!(matches!(
            from_json_records(&json!({"Name": "Ana"})),
            Err(IngestError::NotRecords)
        ));
    }
}
