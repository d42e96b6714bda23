use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use serde::Serialize;

use crate::analysis::summarize;
use crate::ingest::parse_timestamp;
use crate::models::TaskRecord;
use crate::transport::format_date;

pub const RECENT_ACTIVITY: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonalInfo {
    pub name: String,
    pub surname: String,
    pub phone: String,
    pub grade: String,
    pub parent_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcademicInfo {
    pub school: String,
    pub registration_date: String,
    pub subjects: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Performance {
    pub days_worked: usize,
    pub total_tasks: usize,
    pub diagnostics_count: usize,
    pub max_streak: usize,
    pub avg_success: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Activity {
    pub date: String,
    pub subject: String,
    pub task: String,
    pub success_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentProfile {
    pub personal: PersonalInfo,
    pub academic: AcademicInfo,
    pub performance: Performance,
    pub recent_activity: Vec<Activity>,
}

fn registration_label(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|timestamp| format_date(timestamp.date()))
        .unwrap_or_else(|| raw.to_string())
}

fn activity(record: &TaskRecord) -> Activity {
    Activity {
        date: record.completion_date.map(format_date).unwrap_or_default(),
        subject: record.subject.clone(),
        task: record.task.clone(),
        success_rate: format!("{:.2}%", record.success_rate),
    }
}

/// Profile card for one student's drill-down records. `None` when the
/// student has no records.
pub fn student_profile(records: &[TaskRecord]) -> Option<StudentProfile> {
    let first = records.first()?;
    let summary = summarize(records)?;
    let student = &first.student;

    let mut recent: Vec<&TaskRecord> = records.iter().collect();
    recent.sort_by(|a, b| b.completion_date.cmp(&a.completion_date));

    Some(StudentProfile {
        personal: PersonalInfo {
            name: student.name.clone(),
            surname: student.surname.clone(),
            phone: student.phone.clone(),
            grade: student.grade.clone(),
            parent_number: student.parent_number.clone(),
        },
        academic: AcademicInfo {
            school: student.school.clone(),
            registration_date: registration_label(&student.registration_date),
            subjects: summary.subjects_label(),
        },
        performance: Performance {
            days_worked: summary.days_worked,
            total_tasks: summary.total_tasks,
            diagnostics_count: summary.diagnostics_count,
            max_streak: summary.max_streak,
            avg_success: format!("{:.2}%", summary.avg_success),
        },
        recent_activity: recent
            .into_iter()
            .take(RECENT_ACTIVITY)
            .map(activity)
            .collect(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineDay {
    pub date: String,
    pub subjects: String,
    pub tasks_count: usize,
    pub tasks_info: String,
    pub avg_success: String,
    pub has_tasks: bool,
}

/// One entry per day from the first completion date through
/// `max(last completion date, until)`.
pub fn activity_timeline(records: &[TaskRecord], until: NaiveDate) -> Vec<TimelineDay> {
    let mut by_day: BTreeMap<NaiveDate, Vec<&TaskRecord>> = BTreeMap::new();
    for record in records {
        if let Some(date) = record.completion_date {
            by_day.entry(date).or_default().push(record);
        }
    }

    let (Some(first), Some(last)) = (
        by_day.keys().next().copied(),
        by_day.keys().next_back().copied(),
    ) else {
        return Vec::new();
    };

    first
        .iter_days()
        .take_while(|day| *day <= last.max(until))
        .map(|day| match by_day.get(&day) {
            Some(tasks) => {
                let subjects: BTreeSet<&str> = tasks.iter().map(|t| t.subject.as_str()).collect();
                let details: Vec<String> = tasks
                    .iter()
                    .map(|t| format!("{}: {:.1}%", t.task, t.success_rate))
                    .collect();
                let avg = tasks.iter().map(|t| t.success_rate).sum::<f64>() / tasks.len() as f64;

                TimelineDay {
                    date: format_date(day),
                    subjects: subjects.into_iter().collect::<Vec<_>>().join(", "),
                    tasks_count: tasks.len(),
                    tasks_info: format!("{} tasks ({})", tasks.len(), details.join(", ")),
                    avg_success: format!("{avg:.2}%"),
                    has_tasks: true,
                }
            }
            None => TimelineDay {
                date: format_date(day),
                subjects: String::new(),
                tasks_count: 0,
                tasks_info: String::new(),
                avg_success: String::new(),
                has_tasks: false,
            },
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuccessBand {
    High,
    Medium,
    Low,
}

impl SuccessBand {
    pub fn of(rate: f64) -> Self {
        if rate >= 80.0 {
            SuccessBand::High
        } else if rate >= 50.0 {
            SuccessBand::Medium
        } else {
            SuccessBand::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskRow {
    pub date: String,
    pub subject: String,
    pub task: String,
    pub success_rate: String,
    pub status: String,
    pub band: SuccessBand,
}

/// Every task of the student ordered by completion date, then task name.
pub fn task_list(records: &[TaskRecord]) -> Vec<TaskRow> {
    let mut sorted: Vec<&TaskRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.completion_date
            .cmp(&b.completion_date)
            .then_with(|| a.task.cmp(&b.task))
    });

    sorted
        .into_iter()
        .map(|record| TaskRow {
            date: record.completion_date.map(format_date).unwrap_or_default(),
            subject: record.subject.clone(),
            task: record.task.clone(),
            success_rate: format!("{:.2}%", record.success_rate),
            status: record.status.clone(),
            band: SuccessBand::of(record.success_rate),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticScore {
    pub test: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticsView {
    pub has_data: bool,
    pub count: usize,
    /// `"{:.2}%"`, or `"N/A"` without scores.
    pub avg_score: String,
    pub tests: Vec<DiagnosticScore>,
}

/// Diagnostic scores are per student, so the first record carries them all.
pub fn diagnostics_view(records: &[TaskRecord]) -> DiagnosticsView {
    let tests: Vec<DiagnosticScore> = records
        .first()
        .map(|record| {
            record
                .diagnostics
                .iter()
                .map(|(test, score)| DiagnosticScore {
                    test: test.clone(),
                    score: *score,
                })
                .collect()
        })
        .unwrap_or_default();

    let avg_score = if tests.is_empty() {
        "N/A".to_string()
    } else {
        let avg = tests.iter().map(|t| t.score).sum::<f64>() / tests.len() as f64;
        format!("{avg:.2}%")
    };

    DiagnosticsView {
        has_data: !tests.is_empty(),
        count: tests.len(),
        avg_score,
        tests,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubjectMetrics {
    pub subject: String,
    pub tasks: usize,
    pub avg_success: f64,
    pub days_worked: usize,
}

/// Per-subject tasks, average success and distinct days, sorted by subject.
/// `None` unless the student has more than one subject.
pub fn subject_breakdown(records: &[TaskRecord]) -> Option<Vec<SubjectMetrics>> {
    let mut by_subject: BTreeMap<&str, Vec<&TaskRecord>> = BTreeMap::new();
    for record in records {
        by_subject.entry(record.subject.as_str()).or_default().push(record);
    }
    if by_subject.len() <= 1 {
        return None;
    }

    let metrics = by_subject
        .into_iter()
        .map(|(subject, tasks)| {
            let days: BTreeSet<NaiveDate> = tasks.iter().filter_map(|t| t.completion_date).collect();
            SubjectMetrics {
                subject: subject.to_string(),
                tasks: tasks.len(),
                avg_success: tasks.iter().map(|t| t.success_rate).sum::<f64>() / tasks.len() as f64,
                days_worked: days.len(),
            }
        })
        .collect();
    Some(metrics)
}
