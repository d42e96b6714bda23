use std::path::Path;

use chrono::NaiveDate;
use rust_xlsxwriter::{Format, Workbook};

use student_progress_analytics::analysis::analyze;
use student_progress_analytics::ingest::read_table_path;
use student_progress_analytics::models::{CellValue, FilterCriteria};
use student_progress_analytics::normalize::normalize_table;
use student_progress_analytics::schema::DetectionStrategy;

const HEADER: [&str; 8] = [
    "Name",
    "Surname",
    "Phone Number",
    "Grade",
    "Practice Task",
    "Completion Date",
    "Practice Status",
    "Success/Progress Rate",
];

// 2025-02-20 and 2025-02-21 as Excel serial days.
const FEB_20: f64 = 45708.0;
const FEB_21: f64 = 45709.0;

fn write_workbook(path: &Path) {
    let mut workbook = Workbook::new();
    let date = Format::new().set_num_format("yyyy-mm-dd");
    {
        let sheet = workbook.add_worksheet();
        for (col, title) in HEADER.iter().enumerate() {
            sheet.write_string(0, col as u16, *title).unwrap();
        }

        let rows = [
            ("Ana", "Popa", "0712345678", "Fractions", FEB_20, "90%"),
            ("Ana", "Popa", "0712345678", "Decimals", FEB_21, "75%"),
        ];
        for (index, (name, surname, phone, task, day, rate)) in rows.iter().enumerate() {
            let row = index as u32 + 1;
            sheet.write_string(row, 0, *name).unwrap();
            sheet.write_string(row, 1, *surname).unwrap();
            sheet.write_string(row, 2, *phone).unwrap();
            sheet.write_number(row, 3, 7.0).unwrap();
            sheet.write_string(row, 4, *task).unwrap();
            sheet.write_number_with_format(row, 5, *day, &date).unwrap();
            sheet.write_string(row, 6, "Done").unwrap();
            sheet.write_string(row, 7, *rate).unwrap();
        }
    }
    workbook.save(path).unwrap();
}

#[test]
fn workbook_rows_become_typed_cells() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.xlsx");
    write_workbook(&path);

    let table = read_table_path(&path).unwrap();
    assert_eq!(table.columns, HEADER.to_vec());
    assert_eq!(table.rows.len(), 2);

    let first = &table.rows[0];
    assert_eq!(first.get("Phone Number"), Some(&CellValue::text("0712345678")));
    assert_eq!(first.get("Grade"), Some(&CellValue::Number(7.0)));
    assert_eq!(
        first.get("Completion Date"),
        Some(&CellValue::Date(
            NaiveDate::from_ymd_opt(2025, 2, 20).unwrap().and_hms_opt(0, 0, 0).unwrap()
        ))
    );
}

#[test]
fn workbook_feeds_the_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("progress.xlsx");
    write_workbook(&path);

    let table = read_table_path(&path).unwrap();
    let records = normalize_table(&table, &DetectionStrategy::default()).records;
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].student.grade, "7");

    let criteria = FilterCriteria {
        min_days: 2,
        ..FilterCriteria::default()
    };
    let outcome = analyze(&records, &criteria);
    let summary = &outcome.summaries()[0];
    assert_eq!(summary.full_name, "Ana Popa");
    assert_eq!(summary.days_worked, 2);
    assert_eq!(summary.max_streak, 2);
    assert!((summary.avg_success - 82.5).abs() < 1e-9);
}
