use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single spreadsheet cell after ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Date(NaiveDateTime),
    Missing,
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Blank text counts as empty, the same as a missing cell.
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Missing => true,
            CellValue::Text(value) => value.trim().is_empty(),
            CellValue::Number(value) => value.is_nan(),
            CellValue::Date(_) => false,
        }
    }

    pub fn display(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
                write!(f, "{}", *value as i64)
            }
            CellValue::Number(value) => write!(f, "{value}"),
            CellValue::Text(value) => f.write_str(value),
            CellValue::Date(value) if value.time() == chrono::NaiveTime::MIN => {
                write!(f, "{}", value.format("%Y-%m-%d"))
            }
            CellValue::Date(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
            CellValue::Missing => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    cells: Vec<(String, CellValue)>,
}

impl RawRow {
    pub fn new(cells: Vec<(String, CellValue)>) -> Self {
        Self { cells }
    }

    /// Exact column name first, then a case-insensitive match.
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .or_else(|| {
                self.cells
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(column))
            })
            .map(|(_, value)| value)
    }

    pub fn get_or_missing(&self, column: &str) -> &CellValue {
        static MISSING: CellValue = CellValue::Missing;
        self.get(column).unwrap_or(&MISSING)
    }

    pub fn cells(&self) -> &[(String, CellValue)] {
        &self.cells
    }
}

/// An ingested spreadsheet: ordered columns plus rows keyed by those columns.
#[derive(Debug, Clone, Default)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<RawRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentIdentity {
    pub name: String,
    pub surname: String,
    pub full_name: String,
    pub phone: String,
    pub grade: String,
    pub school: String,
    pub parent_number: String,
    pub registration_date: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub student: StudentIdentity,
    pub subject: String,
    pub task: String,
    pub completion_date: Option<NaiveDate>,
    pub status: String,
    pub success_rate: f64,
    pub diagnostics: BTreeMap<String, f64>,
}

impl TaskRecord {
    pub fn full_name(&self) -> &str {
        &self.student.full_name
    }

    pub fn is_done(&self) -> bool {
        self.status == STATUS_DONE
    }
}

pub const STATUS_DONE: &str = "Done";
pub const NOT_STARTED: &str = "Not Started";
pub const ALL_SUBJECTS: &str = "All";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubjectFilter {
    #[default]
    All,
    Only(String),
}

impl SubjectFilter {
    pub fn matches(&self, subject: &str) -> bool {
        match self {
            SubjectFilter::All => true,
            SubjectFilter::Only(expected) => expected == subject,
        }
    }
}

impl From<&str> for SubjectFilter {
    fn from(value: &str) -> Self {
        if value == ALL_SUBJECTS {
            SubjectFilter::All
        } else {
            SubjectFilter::Only(value.to_string())
        }
    }
}

impl From<String> for SubjectFilter {
    fn from(value: String) -> Self {
        SubjectFilter::from(value.as_str())
    }
}

impl From<SubjectFilter> for String {
    fn from(value: SubjectFilter) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SubjectFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubjectFilter::All => f.write_str(ALL_SUBJECTS),
            SubjectFilter::Only(subject) => f.write_str(subject),
        }
    }
}

/// Window and thresholds for one analysis request.
///
/// Both date bounds are inclusive, `min_success_rate` is an exclusive lower
/// bound and `min_days` an inclusive one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCriteria {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub subject: SubjectFilter,
    pub min_success_rate: f64,
    pub min_days: usize,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            start_date: NaiveDate::from_ymd_opt(2025, 2, 19).unwrap_or(NaiveDate::MIN),
            end_date: NaiveDate::from_ymd_opt(2025, 2, 27).unwrap_or(NaiveDate::MIN),
            subject: SubjectFilter::All,
            min_success_rate: 0.0,
            min_days: 7,
        }
    }
}

impl FilterCriteria {
    pub fn admits(&self, record: &TaskRecord) -> bool {
        let in_window = record
            .completion_date
            .map(|date| self.start_date <= date && date <= self.end_date)
            .unwrap_or(false);

        self.subject.matches(&record.subject)
            && in_window
            && record.success_rate > self.min_success_rate
            && record.is_done()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StudentSummary {
    pub full_name: String,
    pub phone: String,
    pub grade: String,
    pub days_worked: usize,
    pub total_tasks: usize,
    pub max_streak: usize,
    pub avg_success: f64,
    pub diagnostics_count: usize,
    pub subjects: Vec<String>,
}

impl StudentSummary {
    pub fn subjects_label(&self) -> String {
        self.subjects.join(", ")
    }
}

/// Qualifying students' filtered records, keyed by full name.
pub type StudentDetail = BTreeMap<String, Vec<TaskRecord>>;
