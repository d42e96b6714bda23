use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::analysis::rank_by_days_worked;
use crate::models::{StudentDetail, StudentSummary, SubjectFilter, TaskRecord};

pub const CHART_TOP_N: usize = 10;

/// Distinct subjects in the normalized records, sorted.
pub fn subjects(records: &[TaskRecord]) -> Vec<String> {
    records
        .iter()
        .map(|record| record.subject.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSummary {
    pub names: Vec<String>,
    pub days_worked: Vec<usize>,
    pub total_tasks: Vec<usize>,
    pub max_streaks: Vec<usize>,
}

pub fn chart_summary(summaries: &[StudentSummary]) -> Option<ChartSummary> {
    if summaries.is_empty() {
        return None;
    }

    let mut ranked = summaries.to_vec();
    rank_by_days_worked(&mut ranked);
    ranked.truncate(CHART_TOP_N);

    Some(ChartSummary {
        names: ranked.iter().map(|s| s.full_name.clone()).collect(),
        days_worked: ranked.iter().map(|s| s.days_worked).collect(),
        total_tasks: ranked.iter().map(|s| s.total_tasks).collect(),
        max_streaks: ranked.iter().map(|s| s.max_streak).collect(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareBy {
    SuccessRate,
    TasksCompleted,
    DaysWorked,
    MaxStreak,
    Diagnostics,
}

impl CompareBy {
    pub fn label(self) -> &'static str {
        match self {
            CompareBy::SuccessRate => "Success Rate",
            CompareBy::TasksCompleted => "Tasks Completed",
            CompareBy::DaysWorked => "Days Worked",
            CompareBy::MaxStreak => "Max Streak",
            CompareBy::Diagnostics => "Diagnostics",
        }
    }

    fn value(self, summary: &StudentSummary) -> f64 {
        match self {
            CompareBy::SuccessRate => summary.avg_success,
            CompareBy::TasksCompleted => summary.total_tasks as f64,
            CompareBy::DaysWorked => summary.days_worked as f64,
            CompareBy::MaxStreak => summary.max_streak as f64,
            CompareBy::Diagnostics => summary.diagnostics_count as f64,
        }
    }

    fn display(self, value: f64) -> String {
        match self {
            CompareBy::SuccessRate => format!("{value:.2}%"),
            _ => format!("{value:.0}"),
        }
    }
}

impl fmt::Display for CompareBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CompareBy {
    type Err = String;

    /// Accepts the dashboard labels as well as kebab-case (`max-streak`).
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase().replace(['-', '_'], " ");
        match normalized.as_str() {
            "success rate" => Ok(CompareBy::SuccessRate),
            "tasks completed" => Ok(CompareBy::TasksCompleted),
            "days worked" => Ok(CompareBy::DaysWorked),
            "max streak" => Ok(CompareBy::MaxStreak),
            "diagnostics" => Ok(CompareBy::Diagnostics),
            _ => Err(format!(
                "unknown comparison metric '{value}', expected one of: success-rate, tasks-completed, days-worked, max-streak, diagnostics"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRow {
    pub name: String,
    pub value: f64,
    pub display_value: String,
    pub grade: String,
    pub days_worked: usize,
    pub total_tasks: usize,
    pub subjects: String,
}

/// Side-by-side view of the selected students, best first. Needs at least two
/// names; students without a summary or drill-down records are left out.
pub fn compare(
    summaries: &[StudentSummary],
    details: &StudentDetail,
    selected: &[String],
    by: CompareBy,
    subject: &SubjectFilter,
) -> Option<Vec<ComparisonRow>> {
    if selected.len() < 2 {
        return None;
    }

    let mut rows: Vec<ComparisonRow> = selected
        .iter()
        .filter_map(|name| {
            let summary = summaries.iter().find(|s| &s.full_name == name)?;
            let records = details.get(name)?;
            if !records.iter().any(|record| subject.matches(&record.subject)) {
                return None;
            }

            let value = by.value(summary);
            Some(ComparisonRow {
                name: name.clone(),
                value,
                display_value: by.display(value),
                grade: summary.grade.clone(),
                days_worked: summary.days_worked,
                total_tasks: summary.total_tasks,
                subjects: summary.subjects_label(),
            })
        })
        .collect();

    rows.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(std::cmp::Ordering::Equal));
    Some(rows)
}
