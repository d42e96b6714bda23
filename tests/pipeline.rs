use chrono::NaiveDate;

use student_progress_analytics::analysis::{analyze, AnalysisOutcome, NoQualifyingData};
use student_progress_analytics::ingest::read_csv;
use student_progress_analytics::models::{FilterCriteria, SubjectFilter};
use student_progress_analytics::normalize::normalize_table;
use student_progress_analytics::schema::{DetectionStrategy, Role};
use student_progress_analytics::transport::SessionPayload;

const SHEET: &str = "\
Name,Surname,Phone Number,Grade,Practice Task,Completion Date,Practice Status,Success/Progress Rate,Practice Task (English),Completion Date (English),Practice Status (English),Success/Progress Rate (English)
Ana,Popa,0712345678,7,Fractions,2025-02-20,Done,90%,,,,
Ana,Popa,0712345678,7,Not Started,2025-02-21,Not Started,Not Started,,,,
Ana,Popa,0712345678,7,Percentages,2025-02-23,Done,40%,,,,
";

fn criteria(min_days: usize) -> FilterCriteria {
    FilterCriteria {
        start_date: NaiveDate::from_ymd_opt(2025, 2, 19).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2025, 2, 27).unwrap(),
        subject: SubjectFilter::All,
        min_success_rate: 50.0,
        min_days,
    }
}

#[test]
fn only_tasks_above_the_rate_count_towards_the_summary() {
    let table = read_csv(SHEET.as_bytes()).unwrap();
    let normalized = normalize_table(&table, &DetectionStrategy::default());
    assert_eq!(normalized.schema.subject_names(), vec!["Math", "English"]);
    assert_eq!(normalized.records.len(), 2);
    assert!(normalized.records.iter().all(|record| record.task != "Not Started"));

    let outcome = analyze(&normalized.records, &criteria(1));
    let summaries = outcome.summaries();
    assert_eq!(summaries.len(), 1);

    let ana = &summaries[0];
    assert_eq!(ana.full_name, "Ana Popa");
    assert_eq!(ana.days_worked, 1);
    assert_eq!(ana.total_tasks, 1);
    assert_eq!(ana.max_streak, 1);
    assert!((ana.avg_success - 90.0).abs() < 1e-9);
    assert_eq!(ana.subjects, vec!["Math".to_string()]);
}

#[test]
fn one_working_day_is_below_a_two_day_threshold() {
    let table = read_csv(SHEET.as_bytes()).unwrap();
    let records = normalize_table(&table, &DetectionStrategy::default()).records;

    assert_eq!(
        analyze(&records, &criteria(2)),
        AnalysisOutcome::NoQualifyingData(NoQualifyingData::BelowDayThreshold { students: 1 })
    );
}

#[test]
fn nameless_rows_never_form_a_student() {
    let sheet = "\
Name,Surname,Phone Number,Practice Task,Completion Date,Practice Status,Success/Progress Rate
,,0711,Fractions,2025-02-20,Done,90%
,,0711,Decimals,2025-02-21,Done,90%
,,0722,Fractions,2025-02-20,Done,90%
,,0722,Decimals,2025-02-21,Done,90%
";
    let table = read_csv(sheet.as_bytes()).unwrap();
    let records = normalize_table(&table, &DetectionStrategy::default()).records;
    assert!(records.is_empty());

    assert_eq!(
        analyze(&records, &criteria(1)),
        AnalysisOutcome::NoQualifyingData(NoQualifyingData::NoMatchingRecords)
    );
}

#[test]
fn subject_without_completion_dates_is_dropped() {
    let sheet = "\
Name,Surname,Practice Task,Completion Date,Practice Status,Success/Progress Rate,Practice Task (English),Practice Status (English),Success/Progress Rate (English)
Ana,Popa,Fractions,2025-02-20,Done,90%,Reading,Done,80%
Ion,Rusu,Decimals,2025-02-21,Done,75,Essay,Done,95%
";
    let table = read_csv(sheet.as_bytes()).unwrap();
    let normalized = normalize_table(&table, &DetectionStrategy::default());

    assert_eq!(normalized.schema.subject_names(), vec!["Math"]);
    assert_eq!(normalized.schema.issues.len(), 1);
    assert_eq!(normalized.schema.issues[0].subject, "English");
    assert_eq!(normalized.schema.issues[0].missing, vec![Role::CompletionDate]);

    assert_eq!(normalized.records.len(), 2);
    assert!(normalized.records.iter().all(|record| record.subject == "Math"));

    let outcome = analyze(&normalized.records, &criteria(1));
    assert_eq!(outcome.summaries().len(), 2);
}

#[test]
fn saved_session_reanalyzes_to_the_same_result() {
    let table = read_csv(SHEET.as_bytes()).unwrap();
    let records = normalize_table(&table, &DetectionStrategy::default()).records;
    let criteria = criteria(1);
    let analysis = analyze(&records, &criteria).into_analysis();

    let encoded = serde_json::to_string(&SessionPayload::new(&records, &criteria, &analysis)).unwrap();
    let payload: SessionPayload = serde_json::from_str(&encoded).unwrap();

    assert_eq!(payload.criteria, criteria);
    let restored = payload.task_records();
    assert_eq!(restored, records);
    assert_eq!(analyze(&restored, &payload.criteria).into_analysis(), analysis);

    let looser = FilterCriteria {
        min_success_rate: 0.0,
        ..payload.criteria.clone()
    };
    let summaries = analyze(&restored, &looser).into_analysis().summaries;
    assert_eq!(summaries[0].total_tasks, 2);
    assert_eq!(summaries[0].days_worked, 2);
}
