//! Student progress analytics: turns wide practice-task spreadsheets into
//! per-student summaries for the desktop viewer and the web dashboards.
//!
//! Pipeline: [`ingest`] -> [`schema`] -> [`normalize`] -> [`analysis`] ->
//! [`transport`]. [`store`] keeps session payloads between requests.

pub mod analysis;
pub mod config;
pub mod ingest;
pub mod insights;
pub mod models;
pub mod normalize;
pub mod profile;
pub mod rate;
pub mod report;
pub mod schema;
pub mod store;
pub mod streak;
pub mod telemetry;
pub mod transport;

pub use analysis::{analyze, Analysis, AnalysisOutcome, NoQualifyingData};
pub use models::{
    CellValue, FilterCriteria, RawRow, StudentDetail, StudentSummary, SubjectFilter, Table,
    TaskRecord,
};
pub use normalize::{normalize_table, Normalized};
pub use schema::{DetectedSchema, DetectionStrategy, SchemaMapping};
