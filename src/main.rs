use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use student_progress_analytics::analysis::{
    analyze, rank_by_days_worked, Analysis, AnalysisOutcome, NoQualifyingData,
};
use student_progress_analytics::config::Settings;
use student_progress_analytics::insights::{self, CompareBy};
use student_progress_analytics::models::{FilterCriteria, SubjectFilter, Table, TaskRecord};
use student_progress_analytics::normalize::normalize_table;
use student_progress_analytics::schema::{DetectionStrategy, SchemaMapping};
use student_progress_analytics::store::{
    FileSessionStore, PgSessionStore, SessionKey, SessionStore, StoreError,
};
use student_progress_analytics::transport::SessionPayload;
use student_progress_analytics::{ingest, profile, report, telemetry};

#[derive(Parser)]
#[command(name = "progress-analytics")]
#[command(about = "Student practice-task progress analytics", long_about = None)]
struct Cli {
    /// Where analysis sessions are kept
    #[arg(long, value_enum, global = true, default_value_t = StoreKind::File)]
    store: StoreKind,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    File,
    Postgres,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Pattern,
    Convention,
}

impl Strategy {
    fn detection(self) -> DetectionStrategy {
        match self {
            Strategy::Pattern => DetectionStrategy::default(),
            Strategy::Convention => DetectionStrategy::Convention(SchemaMapping::conventional()),
        }
    }
}

#[derive(Args, Clone)]
struct FilterArgs {
    /// First day of the window (YYYY-MM-DD, inclusive)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day of the window (YYYY-MM-DD, inclusive)
    #[arg(long)]
    end: Option<NaiveDate>,
    /// Subject name, or "All"
    #[arg(long)]
    subject: Option<String>,
    /// Only tasks scoring strictly above this rate count
    #[arg(long)]
    min_success: Option<f64>,
    /// Minimum distinct working days for a student to be listed
    #[arg(long)]
    min_days: Option<usize>,
}

impl FilterArgs {
    fn apply(&self, base: FilterCriteria) -> FilterCriteria {
        FilterCriteria {
            start_date: self.start.unwrap_or(base.start_date),
            end_date: self.end.unwrap_or(base.end_date),
            subject: self
                .subject
                .as_deref()
                .map(SubjectFilter::from)
                .unwrap_or(base.subject),
            min_success_rate: self.min_success.unwrap_or(base.min_success_rate),
            min_days: self.min_days.unwrap_or(base.min_days),
        }
    }
}

#[derive(Args, Clone)]
struct InputArgs {
    /// Spreadsheet (.xlsx/.xls/.ods workbook, .csv, or .json with an array
    /// of row objects)
    #[arg(long)]
    input: PathBuf,
    #[arg(long, value_enum, default_value_t = Strategy::Pattern)]
    strategy: Strategy,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres session schema
    InitDb,
    /// Show how the columns of a sheet were understood
    Inspect {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Summarize students that meet the filter criteria
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Keep the session so it can be drilled into later
        #[arg(long)]
        save: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export student summaries as CSV
    Export {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value = "student_analysis.csv")]
        out: PathBuf,
    },
    /// Show one student's profile, timeline, tasks and diagnostics from a saved session
    Student {
        #[arg(long)]
        session: String,
        #[arg(long)]
        name: String,
        /// Extend the timeline up to this day (defaults to today)
        #[arg(long)]
        until: Option<NaiveDate>,
    },
    /// Compare students from a saved session
    Compare {
        #[arg(long)]
        session: String,
        #[arg(long, value_delimiter = ',', required = true)]
        students: Vec<String>,
        #[arg(long, default_value = "success-rate")]
        by: CompareBy,
        #[arg(long)]
        subject: Option<String>,
    },
    /// Re-run a saved session with new criteria and overwrite it
    Reanalyze {
        #[arg(long)]
        session: String,
        #[command(flatten)]
        filters: FilterArgs,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

enum Store {
    File(FileSessionStore),
    Postgres(PgSessionStore),
}

impl SessionStore for Store {
    async fn put(&self, key: &SessionKey, payload: &SessionPayload) -> Result<(), StoreError> {
        match self {
            Store::File(store) => store.put(key, payload).await,
            Store::Postgres(store) => store.put(key, payload).await,
        }
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<SessionPayload>, StoreError> {
        match self {
            Store::File(store) => store.get(key).await,
            Store::Postgres(store) => store.get(key).await,
        }
    }

    async fn remove(&self, key: &SessionKey) -> Result<bool, StoreError> {
        match self {
            Store::File(store) => store.remove(key).await,
            Store::Postgres(store) => store.remove(key).await,
        }
    }

    async fn evict_older_than(&self, max_age: std::time::Duration) -> Result<usize, StoreError> {
        match self {
            Store::File(store) => store.evict_older_than(max_age).await,
            Store::Postgres(store) => store.evict_older_than(max_age).await,
        }
    }
}

async fn connect_pg(settings: &Settings) -> anyhow::Result<PgSessionStore> {
    let database_url = settings.require_database_url()?;
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(PgSessionStore::new(pool))
}

async fn open_store(kind: StoreKind, settings: &Settings) -> anyhow::Result<Store> {
    match kind {
        StoreKind::File => {
            tokio::fs::create_dir_all(&settings.store_dir)
                .await
                .with_context(|| format!("failed to create {}", settings.store_dir.display()))?;
            Ok(Store::File(FileSessionStore::new(&settings.store_dir)))
        }
        StoreKind::Postgres => Ok(Store::Postgres(connect_pg(settings).await?)),
    }
}

fn load_table(path: &Path) -> anyhow::Result<Table> {
    ingest::read_table_path(path).with_context(|| format!("failed to ingest {}", path.display()))
}

fn load_records(input: &InputArgs) -> anyhow::Result<Vec<TaskRecord>> {
    let table = load_table(&input.input)?;
    Ok(normalize_table(&table, &input.strategy.detection()).records)
}

async fn load_session(store: &Store, session: &str) -> anyhow::Result<(SessionKey, SessionPayload)> {
    let key = SessionKey::parse(session)?;
    let payload = store
        .get(&key)
        .await?
        .with_context(|| format!("no saved session {key}; run analyze --save first"))?;
    Ok((key, payload))
}

fn print_outcome(outcome: &AnalysisOutcome, limit: usize) {
    match outcome {
        AnalysisOutcome::NoQualifyingData(NoQualifyingData::NoMatchingRecords) => {
            println!("No completed tasks match these filters.");
        }
        AnalysisOutcome::NoQualifyingData(NoQualifyingData::BelowDayThreshold { students }) => {
            println!("{students} students had matching tasks but none worked enough days.");
        }
        AnalysisOutcome::Students(analysis) => {
            let mut ranked = analysis.summaries.clone();
            rank_by_days_worked(&mut ranked);

            println!("Top students by days worked:");
            for summary in ranked.iter().take(limit) {
                println!(
                    "- {} (grade {}, {}) {} days, {} tasks, streak {}, avg {:.2}%, {} diagnostics [{}]",
                    summary.full_name,
                    summary.grade,
                    summary.phone,
                    summary.days_worked,
                    summary.total_tasks,
                    summary.max_streak,
                    summary.avg_success,
                    summary.diagnostics_count,
                    summary.subjects_label()
                );
            }
        }
    }
}

async fn save_session(
    store: &Store,
    settings: &Settings,
    key: SessionKey,
    records: &[TaskRecord],
    criteria: &FilterCriteria,
    analysis: &Analysis,
) -> anyhow::Result<SessionKey> {
    let evicted = store.evict_older_than(settings.session_ttl).await?;
    if evicted > 0 {
        info!(evicted, "evicted stale sessions");
    }

    let payload = SessionPayload::new(records, criteria, analysis);
    store.put(&key, &payload).await?;
    Ok(key)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    match cli.command {
        Commands::InitDb => {
            connect_pg(&settings).await?.init().await?;
            println!("Schema ready.");
        }
        Commands::Inspect { input } => {
            let table = load_table(&input.input)?;
            let normalized = normalize_table(&table, &input.strategy.detection());
            let schema = &normalized.schema;

            println!("Subjects: {}", schema.subject_names().join(", "));
            println!(
                "Subjects with tasks: {}",
                insights::subjects(&normalized.records).join(", ")
            );
            println!("Diagnostic columns: {}", schema.diagnostics.len());
            println!("Identity columns: {}", schema.identity.join(", "));
            for issue in &schema.issues {
                println!("Dropped subject {issue}");
            }
            println!(
                "{} rows produced {} task records.",
                table.rows.len(),
                normalized.records.len()
            );
        }
        Commands::Analyze {
            input,
            filters,
            limit,
            save,
        } => {
            let records = load_records(&input)?;
            let criteria = filters.apply(FilterCriteria::default());
            let outcome = analyze(&records, &criteria);
            print_outcome(&outcome, limit);

            if save {
                let store = open_store(cli.store, &settings).await?;
                let analysis = outcome.into_analysis();
                let key = save_session(
                    &store,
                    &settings,
                    SessionKey::generate(),
                    &records,
                    &criteria,
                    &analysis,
                )
                .await?;
                println!("Session saved as {key}.");
            }
        }
        Commands::Report {
            input,
            filters,
            out,
        } => {
            let records = load_records(&input)?;
            let criteria = filters.apply(FilterCriteria::default());
            let analysis = analyze(&records, &criteria).into_analysis();
            let report = report::build_report(&criteria, &analysis);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            input,
            filters,
            out,
        } => {
            let records = load_records(&input)?;
            let criteria = filters.apply(FilterCriteria::default());
            let analysis = analyze(&records, &criteria).into_analysis();
            let file = std::fs::File::create(&out)
                .with_context(|| format!("failed to create {}", out.display()))?;
            report::write_summary_csv(file, &analysis)?;
            println!(
                "Exported {} students to {}.",
                analysis.summaries.len(),
                out.display()
            );
        }
        Commands::Student {
            session,
            name,
            until,
        } => {
            let store = open_store(cli.store, &settings).await?;
            let (_, payload) = load_session(&store, &session).await?;
            let detail = payload.student_detail();
            let records = detail
                .get(&name)
                .with_context(|| format!("{name} is not among the students of session {session}"))?;

            if let Some(profile) = profile::student_profile(records) {
                println!("{}", serde_json::to_string_pretty(&profile)?);
            }
            let until = until.unwrap_or_else(|| Utc::now().date_naive());
            for day in profile::activity_timeline(records, until) {
                if day.has_tasks {
                    println!("{} {} [{}] avg {}", day.date, day.tasks_info, day.subjects, day.avg_success);
                } else {
                    println!("{} -", day.date);
                }
            }

            println!();
            println!("Tasks:");
            for task in profile::task_list(records) {
                println!(
                    "- {} {} {}: {} ({}, {:?})",
                    task.date, task.subject, task.task, task.success_rate, task.status, task.band
                );
            }

            let diagnostics = profile::diagnostics_view(records);
            println!();
            if diagnostics.has_data {
                println!("Diagnostics ({}, avg {}):", diagnostics.count, diagnostics.avg_score);
                for test in &diagnostics.tests {
                    println!("- {}: {:.2}%", test.test, test.score);
                }
            } else {
                println!("No diagnostics recorded.");
            }

            if let Some(metrics) = profile::subject_breakdown(records) {
                println!();
                println!("By subject:");
                for subject in metrics {
                    println!(
                        "- {}: {} tasks, avg {:.2}%, {} days",
                        subject.subject, subject.tasks, subject.avg_success, subject.days_worked
                    );
                }
            }
        }
        Commands::Compare {
            session,
            students,
            by,
            subject,
        } => {
            let store = open_store(cli.store, &settings).await?;
            let (_, payload) = load_session(&store, &session).await?;
            let subject = subject.as_deref().map(SubjectFilter::from).unwrap_or_default();
            let rows = insights::compare(
                &payload.student_summaries(),
                &payload.student_detail(),
                &students,
                by,
                &subject,
            );

            match rows {
                None => println!("Select at least 2 students to compare."),
                Some(rows) if rows.is_empty() => println!("None of the selected students have data for {subject}."),
                Some(rows) => {
                    println!("Students by {by}:");
                    for row in rows {
                        println!(
                            "- {}: {} (grade {}, {} days, {} tasks) [{}]",
                            row.name, row.display_value, row.grade, row.days_worked, row.total_tasks, row.subjects
                        );
                    }
                }
            }
        }
        Commands::Reanalyze {
            session,
            filters,
            limit,
        } => {
            let store = open_store(cli.store, &settings).await?;
            let (key, payload) = load_session(&store, &session).await?;
            let records = payload.task_records();
            let criteria = filters.apply(payload.criteria.clone());
            let outcome = analyze(&records, &criteria);
            print_outcome(&outcome, limit);

            let analysis = outcome.into_analysis();
            save_session(&store, &settings, key, &records, &criteria, &analysis).await?;
            println!("Session {session} updated.");
        }
    }

    Ok(())
}
