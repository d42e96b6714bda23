use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::ingest::parse_timestamp;
use crate::models::{CellValue, RawRow, StudentIdentity, Table, TaskRecord, NOT_STARTED};
use crate::rate::parse_rate;
use crate::schema::{self, DetectedSchema, DetectionStrategy, SubjectColumnSet};

pub mod identity_columns {
    pub const NAME: &str = "Name";
    pub const SURNAME: &str = "Surname";
    pub const PHONE: &str = "Phone Number";
    pub const GRADE: &str = "Grade";
    pub const PARENT_NUMBER: &str = "Parent Number";
    pub const SCHOOL: &str = "School";
    pub const REGISTRATION_DATE: &str = "Registration Date";
}

pub fn parse_completion_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Date(timestamp) => Some(timestamp.date()),
        CellValue::Text(text) => parse_timestamp(text).map(|timestamp| timestamp.date()),
        CellValue::Number(_) | CellValue::Missing => None,
    }
}

fn text_of(row: &RawRow, column: &str) -> String {
    row.get_or_missing(column).display().trim().to_string()
}

pub fn student_identity(row: &RawRow) -> StudentIdentity {
    use self::identity_columns::*;

    let name = text_of(row, NAME);
    let surname = text_of(row, SURNAME);
    let full_name = format!("{name} {surname}").trim().to_string();

    StudentIdentity {
        full_name,
        name,
        surname,
        phone: text_of(row, PHONE),
        grade: text_of(row, GRADE),
        school: text_of(row, SCHOOL),
        parent_number: text_of(row, PARENT_NUMBER),
        registration_date: text_of(row, REGISTRATION_DATE),
    }
}

/// `"Diagnostic 2 - Accuracy"` becomes `"Diagnostic 2"`.
pub fn diagnostic_name(column: &str) -> String {
    let trimmed = column.trim();
    let lowered = trimmed.to_ascii_lowercase();
    let base = match lowered.strip_suffix("- accuracy") {
        Some(stem) => &trimmed[..stem.len()],
        None => trimmed,
    };
    base.trim().to_string()
}

pub fn extract_diagnostics(row: &RawRow, columns: &[String]) -> BTreeMap<String, f64> {
    columns
        .iter()
        .filter_map(|column| {
            let value = row.get(column)?;
            if value.is_empty() {
                return None;
            }
            Some((diagnostic_name(column), parse_rate(value)))
        })
        .collect()
}

fn is_skipped_task(value: &CellValue) -> bool {
    value.is_empty() || matches!(value, CellValue::Text(text) if text.trim() == NOT_STARTED)
}

fn task_record(
    row: &RawRow,
    columns: &SubjectColumnSet,
    student: &StudentIdentity,
    diagnostics: &BTreeMap<String, f64>,
) -> Option<TaskRecord> {
    let task = row.get_or_missing(&columns.task);
    if is_skipped_task(task) {
        return None;
    }

    let date_cell = row.get_or_missing(&columns.completion_date);
    let completion_date = parse_completion_date(date_cell);
    if completion_date.is_none() && !date_cell.is_empty() {
        debug!(student = %student.full_name, subject = %columns.subject, raw = %date_cell, "unparsable completion date");
    }

    Some(TaskRecord {
        student: student.clone(),
        subject: columns.subject.clone(),
        task: task.display().trim().to_string(),
        completion_date,
        status: text_of(row, &columns.status),
        success_rate: parse_rate(row.get_or_missing(&columns.rate)),
        diagnostics: diagnostics.clone(),
    })
}

/// Expands one wide row into one record per subject the student worked on.
/// Rows without a name or surname belong to nobody and produce nothing.
pub fn normalize_row(row: &RawRow, schema: &DetectedSchema) -> Vec<TaskRecord> {
    let student = student_identity(row);
    if student.full_name.is_empty() {
        debug!(phone = %student.phone, "row without a student name, skipping");
        return Vec::new();
    }
    let diagnostics = extract_diagnostics(row, &schema.diagnostics);

    schema
        .subjects
        .iter()
        .filter_map(|columns| task_record(row, columns, &student, &diagnostics))
        .collect()
}

pub fn normalize(table: &Table, schema: &DetectedSchema) -> Vec<TaskRecord> {
    let records: Vec<TaskRecord> = table
        .rows
        .iter()
        .flat_map(|row| normalize_row(row, schema))
        .collect();

    info!(
        rows = table.rows.len(),
        records = records.len(),
        subjects = schema.subjects.len(),
        "rows normalized"
    );
    records
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub schema: DetectedSchema,
    pub records: Vec<TaskRecord>,
}

/// Detects the schema of `table` and normalizes every row against it.
pub fn normalize_table(table: &Table, strategy: &DetectionStrategy) -> Normalized {
    let schema = schema::detect(&table.columns, strategy);
    let records = normalize(table, &schema);
    Normalized { schema, records }
}
