//! Plain records for handing analysis results to other processes or
//! persisting them between requests.
//!
//! Field names follow the dashboard contract (`Full_Name`, `Days_Worked`,
//! ...). Dates travel as `YYYY-MM-DD`, timestamps as `YYYY-MM-DD HH:MM:SS`.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Number, Value};
use tracing::warn;

use crate::analysis::Analysis;
use crate::ingest::parse_timestamp;
use crate::models::{CellValue, FilterCriteria, StudentDetail, StudentIdentity, StudentSummary, TaskRecord};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    if timestamp.time() == NaiveTime::MIN {
        return format_date(timestamp.date());
    }
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Reads back either layout written by [`format_timestamp`].
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    parse_timestamp(text).map(|timestamp| timestamp.date())
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn float_to_primitive(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        return Value::from(value as i64);
    }
    match Number::from_f64(value) {
        Some(number) => Value::Number(number),
        None => {
            warn!(value, "non-finite number, storing as text");
            Value::String(value.to_string())
        }
    }
}

pub fn cell_to_primitive(value: &CellValue) -> Value {
    match value {
        CellValue::Number(number) => float_to_primitive(*number),
        CellValue::Text(text) => Value::String(text.clone()),
        CellValue::Date(timestamp) => Value::String(format_timestamp(*timestamp)),
        CellValue::Missing => Value::Null,
    }
}

/// Converts one serializable value to JSON, falling back to its debug text
/// when it has no JSON form.
pub fn to_primitive<T>(value: &T) -> Value
where
    T: Serialize + fmt::Debug + ?Sized,
{
    match serde_json::to_value(value) {
        Ok(converted) => converted,
        Err(err) => {
            warn!(error = %err, "value has no JSON form, storing as text");
            Value::String(format!("{value:?}"))
        }
    }
}

/// Converts a batch element by element, so only the elements without a JSON
/// form fall back to text.
pub fn to_primitive_each<'a, T, I>(items: I) -> Value
where
    T: Serialize + fmt::Debug + 'a,
    I: IntoIterator<Item = &'a T>,
{
    Value::Array(items.into_iter().map(to_primitive).collect())
}

/// Converts a keyed batch entry by entry.
pub fn to_primitive_entries<'a, K, T, I>(entries: I) -> Value
where
    K: fmt::Display + 'a,
    T: Serialize + fmt::Debug + 'a,
    I: IntoIterator<Item = (&'a K, &'a T)>,
{
    Value::Object(
        entries
            .into_iter()
            .map(|(key, value)| (key.to_string(), to_primitive(value)))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryRecord {
    #[serde(rename = "Full_Name")]
    pub full_name: String,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Grade")]
    pub grade: String,
    #[serde(rename = "Days_Worked")]
    pub days_worked: u64,
    #[serde(rename = "Total_Tasks")]
    pub total_tasks: u64,
    #[serde(rename = "Diagnostics_Count")]
    pub diagnostics_count: u64,
    #[serde(rename = "Max_Streak")]
    pub max_streak: u64,
    #[serde(rename = "Avg_Success")]
    pub avg_success: f64,
    #[serde(rename = "Subjects")]
    pub subjects: String,
}

impl From<&StudentSummary> for SummaryRecord {
    fn from(summary: &StudentSummary) -> Self {
        Self {
            full_name: summary.full_name.clone(),
            phone: summary.phone.clone(),
            grade: summary.grade.clone(),
            days_worked: summary.days_worked as u64,
            total_tasks: summary.total_tasks as u64,
            diagnostics_count: summary.diagnostics_count as u64,
            max_streak: summary.max_streak as u64,
            avg_success: round2(summary.avg_success),
            subjects: summary.subjects_label(),
        }
    }
}

impl From<&SummaryRecord> for StudentSummary {
    fn from(record: &SummaryRecord) -> Self {
        Self {
            full_name: record.full_name.clone(),
            phone: record.phone.clone(),
            grade: record.grade.clone(),
            days_worked: record.days_worked as usize,
            total_tasks: record.total_tasks as usize,
            max_streak: record.max_streak as usize,
            avg_success: record.avg_success,
            diagnostics_count: record.diagnostics_count as usize,
            subjects: record
                .subjects
                .split(',')
                .map(str::trim)
                .filter(|subject| !subject.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    #[serde(rename = "Subject")]
    pub subject: String,
    #[serde(rename = "Task")]
    pub task: String,
    #[serde(rename = "Completion_Date")]
    pub completion_date: Option<String>,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "Success_Rate")]
    pub success_rate: f64,
    #[serde(rename = "Diagnostics", default)]
    pub diagnostics: BTreeMap<String, f64>,
}

impl From<&TaskRecord> for DetailRecord {
    fn from(record: &TaskRecord) -> Self {
        Self {
            subject: record.subject.clone(),
            task: record.task.clone(),
            completion_date: record.completion_date.map(format_date),
            status: record.status.clone(),
            success_rate: record.success_rate,
            diagnostics: record.diagnostics.clone(),
        }
    }
}

impl DetailRecord {
    pub fn completion_date(&self) -> Option<NaiveDate> {
        self.completion_date.as_deref().and_then(parse_date)
    }

    pub fn into_task_record(self, student: StudentIdentity) -> TaskRecord {
        TaskRecord {
            completion_date: self.completion_date(),
            student,
            subject: self.subject,
            task: self.task,
            status: self.status,
            success_rate: self.success_rate,
            diagnostics: self.diagnostics,
        }
    }
}

/// A normalized record with its identity, for re-running analyses later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub student: StudentIdentity,
    #[serde(flatten)]
    pub detail: DetailRecord,
}

impl From<&TaskRecord> for StoredRecord {
    fn from(record: &TaskRecord) -> Self {
        Self {
            student: record.student.clone(),
            detail: DetailRecord::from(record),
        }
    }
}

pub fn summaries_to_transport(summaries: &[StudentSummary]) -> Vec<SummaryRecord> {
    summaries.iter().map(SummaryRecord::from).collect()
}

pub fn details_to_transport(details: &StudentDetail) -> BTreeMap<String, Vec<DetailRecord>> {
    details
        .iter()
        .map(|(name, records)| (name.clone(), records.iter().map(DetailRecord::from).collect()))
        .collect()
}

/// Rebuilds drill-down records; phone and grade come back from the matching
/// summary when there is one.
pub fn restore_details(
    details: &BTreeMap<String, Vec<DetailRecord>>,
    summaries: &[SummaryRecord],
) -> StudentDetail {
    details
        .iter()
        .map(|(name, records)| {
            let summary = summaries.iter().find(|summary| &summary.full_name == name);
            let student = StudentIdentity {
                full_name: name.clone(),
                phone: summary.map(|s| s.phone.clone()).unwrap_or_default(),
                grade: summary.map(|s| s.grade.clone()).unwrap_or_default(),
                ..StudentIdentity::default()
            };
            let restored = records
                .iter()
                .cloned()
                .map(|record| record.into_task_record(student.clone()))
                .collect();
            (name.clone(), restored)
        })
        .collect()
}

/// Everything one analysis session keeps between requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub criteria: FilterCriteria,
    #[serde(default)]
    pub records: Vec<StoredRecord>,
    pub summaries: Vec<SummaryRecord>,
    pub details: BTreeMap<String, Vec<DetailRecord>>,
}

impl SessionPayload {
    pub fn new(records: &[TaskRecord], criteria: &FilterCriteria, analysis: &Analysis) -> Self {
        Self {
            criteria: criteria.clone(),
            records: records.iter().map(StoredRecord::from).collect(),
            summaries: summaries_to_transport(&analysis.summaries),
            details: details_to_transport(&analysis.details),
        }
    }

    pub fn task_records(&self) -> Vec<TaskRecord> {
        self.records
            .iter()
            .cloned()
            .map(|stored| stored.detail.into_task_record(stored.student))
            .collect()
    }

    /// Drill-down records with the full identity of each student when the
    /// payload still carries the normalized records.
    pub fn student_detail(&self) -> StudentDetail {
        let mut detail = restore_details(&self.details, &self.summaries);
        for (name, records) in detail.iter_mut() {
            let stored = self
                .records
                .iter()
                .find(|stored| &stored.student.full_name == name);
            if let Some(stored) = stored {
                for record in records.iter_mut() {
                    record.student = stored.student.clone();
                }
            }
        }
        detail
    }

    pub fn summary(&self, full_name: &str) -> Option<&SummaryRecord> {
        self.summaries.iter().find(|summary| summary.full_name == full_name)
    }

    pub fn student_summaries(&self) -> Vec<StudentSummary> {
        self.summaries.iter().map(StudentSummary::from).collect()
    }

    pub fn to_json(&self) -> Value {
        json!({
            "criteria": to_primitive(&self.criteria),
            "records": to_primitive_each(&self.records),
            "summaries": to_primitive_each(&self.summaries),
            "details": to_primitive_entries(&self.details),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyze;
    use crate::models::SubjectFilter;
    use serde_json::json;

    fn record(day: u32, rate: f64) -> TaskRecord {
        TaskRecord {
            student: StudentIdentity {
                name: "Ana".to_string(),
                surname: "Popa".to_string(),
                full_name: "Ana Popa".to_string(),
                phone: "0712345678".to_string(),
                grade: "7".to_string(),
                ..StudentIdentity::default()
            },
            subject: "Math".to_string(),
            task: format!("Task {day}"),
            completion_date: NaiveDate::from_ymd_opt(2025, 2, day),
            status: "Done".to_string(),
            success_rate: rate,
            diagnostics: BTreeMap::from([("Diagnostic 1".to_string(), 55.0)]),
        }
    }

    fn criteria() -> FilterCriteria {
        FilterCriteria {
            start_date: NaiveDate::from_ymd_opt(2025, 2, 19).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 2, 27).unwrap(),
            subject: SubjectFilter::All,
            min_success_rate: 0.0,
            min_days: 1,
        }
    }

    #[test]
    fn summary_record_uses_dashboard_field_names() {
        let records = vec![record(20, 90.0), record(21, 45.5)];
        let analysis = analyze(&records, &criteria()).into_analysis();
        let value = to_primitive(&summaries_to_transport(&analysis.summaries));

        assert_eq!(
            value,
            json!([{
                "Full_Name": "Ana Popa",
                "Phone": "0712345678",
                "Grade": "7",
                "Days_Worked": 2,
                "Total_Tasks": 2,
                "Diagnostics_Count": 1,
                "Max_Streak": 2,
                "Avg_Success": 67.75,
                "Subjects": "Math"
            }])
        );
    }

    #[test]
    fn detail_round_trip_keeps_dates_and_rates() {
        let records = vec![record(20, 90.0), record(23, 33.5)];
        let analysis = analyze(&records, &criteria()).into_analysis();
        let payload = SessionPayload::new(&records, &criteria(), &analysis);

        let text = serde_json::to_string(&payload).unwrap();
        let reloaded: SessionPayload = serde_json::from_str(&text).unwrap();
        let detail = reloaded.student_detail();

        let restored = &detail["Ana Popa"];
        let dates: Vec<_> = restored.iter().map(|r| r.completion_date).collect();
        let original: Vec<_> = analysis.details["Ana Popa"].iter().map(|r| r.completion_date).collect();
        assert_eq!(dates, original);
        assert_eq!(restored[1].success_rate, 33.5);
        assert_eq!(restored[0].student.phone, "0712345678");
        assert_eq!(reloaded.task_records(), records);
    }

    #[test]
    fn detail_dates_serialize_as_plain_days() {
        let value = to_primitive(&DetailRecord::from(&record(20, 90.0)));
        assert_eq!(value["Completion_Date"], json!("2025-02-20"));
        assert_eq!(value["Diagnostics"], json!({"Diagnostic 1": 55.0}));
    }

    #[test]
    fn cells_reduce_to_primitives() {
        let noon = NaiveDate::from_ymd_opt(2025, 2, 20)
            .unwrap()
            .and_hms_opt(12, 30, 0)
            .unwrap();
        assert_eq!(cell_to_primitive(&CellValue::Number(7.0)), json!(7));
        assert_eq!(cell_to_primitive(&CellValue::Number(7.25)), json!(7.25));
        assert_eq!(cell_to_primitive(&CellValue::Date(noon)), json!("2025-02-20 12:30:00"));
        assert_eq!(cell_to_primitive(&CellValue::Missing), Value::Null);
        assert_eq!(cell_to_primitive(&CellValue::Number(f64::INFINITY)), json!("inf"));
    }

    #[test]
    fn unserializable_values_fall_back_to_text() {
        let value = to_primitive(&BTreeMap::from([((1, 2), "pair")]));
        assert!(value.is_string());
    }

    #[test]
    fn one_bad_element_keeps_the_rest_of_the_batch() {
        let batch = vec![
            BTreeMap::from([((1, 2), "pair")]),
            BTreeMap::new(),
        ];
        let value = to_primitive_each(&batch);
        assert!(value[0].is_string());
        assert_eq!(value[1], json!({}));

        let keyed = BTreeMap::from([
            ("bad".to_string(), BTreeMap::from([((3, 4), 1.5)])),
            ("good".to_string(), BTreeMap::new()),
        ]);
        let value = to_primitive_entries(&keyed);
        assert!(value["bad"].is_string());
        assert_eq!(value["good"], json!({}));
    }

    #[test]
    fn session_json_uses_dashboard_shape() {
        let records = vec![record(20, 90.0)];
        let analysis = analyze(&records, &criteria()).into_analysis();
        let value = SessionPayload::new(&records, &criteria(), &analysis).to_json();

        assert_eq!(value["criteria"]["subject"], json!("All"));
        assert_eq!(value["summaries"][0]["Full_Name"], json!("Ana Popa"));
        assert_eq!(value["details"]["Ana Popa"][0]["Completion_Date"], json!("2025-02-20"));
        assert_eq!(value["records"][0]["student"]["phone"], json!("0712345678"));
    }

    #[test]
    fn stored_dates_accept_both_layouts() {
        assert_eq!(parse_date("2025-02-20"), NaiveDate::from_ymd_opt(2025, 2, 20));
        assert_eq!(parse_date("2025-02-20 08:15:00"), NaiveDate::from_ymd_opt(2025, 2, 20));
        assert_eq!(parse_date("yesterday"), None);
    }
}
