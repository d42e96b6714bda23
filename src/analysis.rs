use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::info;

use crate::models::{FilterCriteria, StudentDetail, StudentSummary, TaskRecord};
use crate::streak::max_streak;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub summaries: Vec<StudentSummary>,
    pub details: StudentDetail,
}

/// Why an analysis produced no students.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoQualifyingData {
    NoMatchingRecords,
    BelowDayThreshold { students: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Students(Analysis),
    NoQualifyingData(NoQualifyingData),
}

impl AnalysisOutcome {
    pub fn summaries(&self) -> &[StudentSummary] {
        match self {
            AnalysisOutcome::Students(analysis) => &analysis.summaries,
            AnalysisOutcome::NoQualifyingData(_) => &[],
        }
    }

    pub fn into_analysis(self) -> Analysis {
        match self {
            AnalysisOutcome::Students(analysis) => analysis,
            AnalysisOutcome::NoQualifyingData(_) => Analysis::default(),
        }
    }
}

/// Metrics over one student's records; identity comes from the first one.
pub fn summarize<'a, I>(records: I) -> Option<StudentSummary>
where
    I: IntoIterator<Item = &'a TaskRecord>,
{
    let mut records = records.into_iter().peekable();
    let first = (*records.peek()?).clone();

    let mut dates: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut subjects: BTreeSet<String> = BTreeSet::new();
    let mut total_tasks = 0usize;
    let mut total_success = 0.0;

    for record in records {
        if let Some(date) = record.completion_date {
            dates.insert(date);
        }
        subjects.insert(record.subject.clone());
        total_tasks += 1;
        total_success += record.success_rate;
    }

    Some(StudentSummary {
        full_name: first.student.full_name,
        phone: first.student.phone,
        grade: first.student.grade,
        days_worked: dates.len(),
        total_tasks,
        max_streak: max_streak(&dates),
        avg_success: total_success / total_tasks as f64,
        diagnostics_count: first.diagnostics.len(),
        subjects: subjects.into_iter().collect(),
    })
}

/// Filters `records` by `criteria`, groups them by student and keeps the
/// students that worked on at least `criteria.min_days` distinct days.
pub fn analyze(records: &[TaskRecord], criteria: &FilterCriteria) -> AnalysisOutcome {
    let mut groups: BTreeMap<&str, Vec<&TaskRecord>> = BTreeMap::new();

    for record in records.iter().filter(|record| criteria.admits(record)) {
        groups.entry(record.full_name()).or_default().push(record);
    }

    if groups.is_empty() {
        info!(records = records.len(), "no records matched the filter criteria");
        return AnalysisOutcome::NoQualifyingData(NoQualifyingData::NoMatchingRecords);
    }

    let mut analysis = Analysis::default();
    for (full_name, group) in &groups {
        let Some(summary) = summarize(group.iter().copied()) else {
            continue;
        };
        if summary.days_worked < criteria.min_days {
            continue;
        }

        analysis
            .details
            .insert(full_name.to_string(), group.iter().map(|record| (*record).clone()).collect());
        analysis.summaries.push(summary);
    }

    info!(
        records = records.len(),
        students = groups.len(),
        qualifying = analysis.summaries.len(),
        "analysis complete"
    );

    if analysis.summaries.is_empty() {
        return AnalysisOutcome::NoQualifyingData(NoQualifyingData::BelowDayThreshold {
            students: groups.len(),
        });
    }

    AnalysisOutcome::Students(analysis)
}

/// Most days worked first; equal counts keep their existing order.
pub fn rank_by_days_worked(summaries: &mut [StudentSummary]) {
    summaries.sort_by(|a, b| b.days_worked.cmp(&a.days_worked));
}
