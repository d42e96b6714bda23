use std::fmt::Write;
use std::io;

use crate::analysis::{rank_by_days_worked, Analysis};
use crate::models::{FilterCriteria, TaskRecord};
use crate::transport::{format_date, summaries_to_transport};

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectMix {
    pub subject: String,
    pub count: usize,
    pub avg_success: f64,
}

pub fn summarize_by_subject(records: &[TaskRecord]) -> Vec<SubjectMix> {
    let mut map: std::collections::HashMap<String, (usize, f64)> =
        std::collections::HashMap::new();

    for record in records {
        let entry = map.entry(record.subject.clone()).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += record.success_rate;
    }

    let mut mix: Vec<SubjectMix> = map
        .into_iter()
        .map(|(subject, (count, total_success))| SubjectMix {
            subject,
            count,
            avg_success: if count == 0 {
                0.0
            } else {
                total_success / count as f64
            },
        })
        .collect();

    mix.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.subject.cmp(&b.subject)));
    mix
}

pub fn build_report(criteria: &FilterCriteria, analysis: &Analysis) -> String {
    let qualifying: Vec<TaskRecord> = analysis.details.values().flatten().cloned().collect();
    let mix = summarize_by_subject(&qualifying);
    let mut ranked = analysis.summaries.clone();
    rank_by_days_worked(&mut ranked);

    let mut output = String::new();

    let _ = writeln!(output, "# Student Progress Report");
    let _ = writeln!(
        output,
        "Generated for {} ({} to {}, success above {:.1}%, at least {} days)",
        criteria.subject,
        criteria.start_date,
        criteria.end_date,
        criteria.min_success_rate,
        criteria.min_days
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Subject Mix");

    if mix.is_empty() {
        let _ = writeln!(output, "No completed tasks in this window.");
    } else {
        for entry in mix.iter() {
            let _ = writeln!(
                output,
                "- {}: {} tasks (avg success {:.1}%)",
                entry.subject, entry.count, entry.avg_success
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Active Students");

    if ranked.is_empty() {
        let _ = writeln!(output, "No students met the criteria.");
    } else {
        for summary in ranked.iter().take(10) {
            let _ = writeln!(
                output,
                "- {} (grade {}) {} days, {} tasks, streak {}, avg {:.2}% [{}]",
                summary.full_name,
                summary.grade,
                summary.days_worked,
                summary.total_tasks,
                summary.max_streak,
                summary.avg_success,
                summary.subjects_label()
            );
        }
    }

    let mut recent = qualifying;
    recent.sort_by(|a, b| b.completion_date.cmp(&a.completion_date));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Activity");

    if recent.is_empty() {
        let _ = writeln!(output, "No completed tasks in this window.");
    } else {
        for record in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {} at {:.1}%",
                record.full_name(),
                record.subject,
                record.completion_date.map(format_date).unwrap_or_default(),
                record.task,
                record.success_rate
            );
        }
    }

    output
}

/// Summary rows in dashboard column order.
pub fn write_summary_csv<W: io::Write>(writer: W, analysis: &Analysis) -> csv::Result<()> {
    let mut ranked = analysis.summaries.clone();
    rank_by_days_worked(&mut ranked);

    let mut writer = csv::Writer::from_writer(writer);
    for record in summaries_to_transport(&ranked) {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
