use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, warn};

pub const DEFAULT_SUBJECT: &str = "Math";

/// The four columns every subject needs before its tasks can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Task,
    CompletionDate,
    Status,
    Rate,
}

impl Role {
    pub const ALL: [Role; 4] = [Role::Task, Role::CompletionDate, Role::Status, Role::Rate];

    pub fn column_name(self) -> &'static str {
        match self {
            Role::Task => "Practice Task",
            Role::CompletionDate => "Completion Date",
            Role::Status => "Practice Status",
            Role::Rate => "Success/Progress Rate",
        }
    }

    pub fn from_label(label: &str) -> Option<Role> {
        let label = label.trim().to_lowercase();
        Role::ALL
            .into_iter()
            .find(|role| role.column_name().to_lowercase() == label)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Resolved column names for one subject, as they appear in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectColumnSet {
    pub subject: String,
    pub task: String,
    pub completion_date: String,
    pub status: String,
    pub rate: String,
}

impl SubjectColumnSet {
    fn from_roles(subject: String, roles: &BTreeMap<Role, String>) -> Result<Self, SchemaIssue> {
        let missing: Vec<Role> = Role::ALL
            .into_iter()
            .filter(|role| !roles.contains_key(role))
            .collect();

        match (
            roles.get(&Role::Task),
            roles.get(&Role::CompletionDate),
            roles.get(&Role::Status),
            roles.get(&Role::Rate),
        ) {
            (Some(task), Some(completion_date), Some(status), Some(rate)) => Ok(Self {
                subject,
                task: task.clone(),
                completion_date: completion_date.clone(),
                status: status.clone(),
                rate: rate.clone(),
            }),
            _ => Err(SchemaIssue { subject, missing }),
        }
    }

    pub fn column(&self, role: Role) -> &str {
        match role {
            Role::Task => &self.task,
            Role::CompletionDate => &self.completion_date,
            Role::Status => &self.status,
            Role::Rate => &self.rate,
        }
    }
}

/// A subject dropped because some of its role columns are absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaIssue {
    pub subject: String,
    pub missing: Vec<Role>,
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let missing: Vec<&str> = self.missing.iter().map(|role| role.column_name()).collect();
        write!(f, "{} (missing {})", self.subject, missing.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectMapping {
    pub subject: String,
    pub columns: BTreeMap<Role, String>,
}

/// Declarative subject -> role -> column table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SchemaMapping {
    pub subjects: Vec<SubjectMapping>,
}

impl SchemaMapping {
    /// Unqualified columns for Math and `(English)`-suffixed ones for English.
    pub fn conventional() -> Self {
        SchemaMapping::default()
            .with_subject(DEFAULT_SUBJECT, None)
            .with_subject("English", Some("English"))
    }

    /// Adds a subject whose columns are the role names, optionally followed
    /// by ` (<suffix>)`.
    pub fn with_subject(mut self, subject: &str, suffix: Option<&str>) -> Self {
        let columns = Role::ALL
            .into_iter()
            .map(|role| {
                let column = match suffix {
                    Some(suffix) => format!("{} ({suffix})", role.column_name()),
                    None => role.column_name().to_string(),
                };
                (role, column)
            })
            .collect();

        self.subjects.push(SubjectMapping {
            subject: subject.to_string(),
            columns,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionStrategy {
    Convention(SchemaMapping),
    Pattern { default_subject: String },
}

impl Default for DetectionStrategy {
    fn default() -> Self {
        DetectionStrategy::Pattern {
            default_subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectedSchema {
    pub subjects: Vec<SubjectColumnSet>,
    pub diagnostics: Vec<String>,
    pub identity: Vec<String>,
    pub issues: Vec<SchemaIssue>,
}

impl DetectedSchema {
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn subject_names(&self) -> Vec<&str> {
        self.subjects.iter().map(|set| set.subject.as_str()).collect()
    }
}

pub fn is_diagnostic_column(column: &str) -> bool {
    let lowered = column.to_lowercase();
    lowered.contains("diagnostic") && lowered.contains("accuracy")
}

/// Splits `"Practice Task (English)"` into `("Practice Task", "English")`.
fn split_qualifier(column: &str) -> Option<(&str, &str)> {
    let open = column.find('(')?;
    let close = open + column[open..].find(')')?;
    let subject = column[open + 1..close].trim();
    if subject.is_empty() {
        return None;
    }
    Some((column[..open].trim(), subject))
}

pub fn detect(columns: &[String], strategy: &DetectionStrategy) -> DetectedSchema {
    let diagnostics: Vec<String> = columns
        .iter()
        .filter(|column| is_diagnostic_column(column))
        .cloned()
        .collect();

    let (candidates, claimed) = match strategy {
        DetectionStrategy::Convention(mapping) => by_convention(columns, mapping),
        DetectionStrategy::Pattern { default_subject } => by_pattern(columns, default_subject),
    };

    let mut schema = DetectedSchema {
        diagnostics,
        ..DetectedSchema::default()
    };

    for (subject, roles) in candidates {
        match SubjectColumnSet::from_roles(subject, &roles) {
            Ok(set) => schema.subjects.push(set),
            Err(issue) => {
                warn!(subject = %issue.subject, missing = ?issue.missing, "dropping subject with incomplete columns");
                schema.issues.push(issue);
            }
        }
    }

    schema.identity = columns
        .iter()
        .filter(|column| !is_diagnostic_column(column) && !claimed.contains(column))
        .cloned()
        .collect();

    debug!(
        subjects = ?schema.subject_names(),
        diagnostics = schema.diagnostics.len(),
        identity = schema.identity.len(),
        "schema detected"
    );
    schema
}

type Candidates = Vec<(String, BTreeMap<Role, String>)>;

fn candidate_entry<'a>(
    candidates: &'a mut Candidates,
    subject: &str,
) -> &'a mut BTreeMap<Role, String> {
    let index = match candidates.iter().position(|(name, _)| name == subject) {
        Some(index) => index,
        None => {
            candidates.push((subject.to_string(), BTreeMap::new()));
            candidates.len() - 1
        }
    };
    &mut candidates[index].1
}

fn by_convention(columns: &[String], mapping: &SchemaMapping) -> (Candidates, Vec<String>) {
    let mut candidates = Candidates::new();
    let mut claimed = Vec::new();

    for subject in &mapping.subjects {
        let roles = candidate_entry(&mut candidates, &subject.subject);
        for (role, expected) in &subject.columns {
            let found = columns
                .iter()
                .find(|column| column.trim().eq_ignore_ascii_case(expected.trim()));
            if let Some(column) = found {
                roles.insert(*role, column.clone());
                claimed.push(column.clone());
            }
        }
    }

    (candidates, claimed)
}

fn by_pattern(columns: &[String], default_subject: &str) -> (Candidates, Vec<String>) {
    let mut candidates = Candidates::new();
    let mut claimed = Vec::new();

    for column in columns.iter().filter(|column| !is_diagnostic_column(column)) {
        let (subject, role) = match split_qualifier(column) {
            Some((prefix, subject)) => (subject, Role::from_label(prefix)),
            None => (default_subject, Role::from_label(column)),
        };

        let Some(role) = role else { continue };
        let roles = candidate_entry(&mut candidates, subject);
        roles.entry(role).or_insert_with(|| column.clone());
        claimed.push(column.clone());
    }

    (candidates, claimed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn two_subject_columns() -> Vec<String> {
        columns(&[
            "Name",
            "Surname",
            "Practice Task",
            "Completion Date",
            "Practice Status",
            "Success/Progress Rate",
            "Practice Task (English)",
            "Completion Date (English)",
            "Practice Status (English)",
            "Success/Progress Rate (English)",
            "Diagnostic 1 - Accuracy",
            "Grade",
        ])
    }

    #[test]
    fn pattern_finds_default_and_suffixed_subjects() {
        let schema = detect(&two_subject_columns(), &DetectionStrategy::default());
        assert_eq!(schema.subject_names(), vec!["Math", "English"]);
        assert_eq!(schema.subjects[1].rate, "Success/Progress Rate (English)");
        assert_eq!(schema.diagnostics, vec!["Diagnostic 1 - Accuracy"]);
        assert_eq!(schema.identity, vec!["Name", "Surname", "Grade"]);
        assert!(schema.is_complete());
    }

    #[test]
    fn convention_matches_the_fixed_table() {
        let strategy = DetectionStrategy::Convention(SchemaMapping::conventional());
        let schema = detect(&two_subject_columns(), &strategy);
        assert_eq!(schema.subject_names(), vec!["Math", "English"]);
        assert_eq!(schema.subjects[0].completion_date, "Completion Date");
    }

    #[test]
    fn tolerates_order_and_case() {
        let cols = columns(&[
            "success/progress rate (Physics)",
            "School",
            "PRACTICE STATUS (Physics)",
            "completion date (Physics)",
            "Practice task (Physics)",
        ]);
        let schema = detect(&cols, &DetectionStrategy::default());
        assert_eq!(schema.subject_names(), vec!["Physics"]);
        assert_eq!(schema.subjects[0].status, "PRACTICE STATUS (Physics)");
        assert_eq!(schema.identity, vec!["School"]);
    }

    #[test]
    fn incomplete_subject_is_dropped_not_fatal() {
        let cols = columns(&[
            "Practice Task",
            "Completion Date",
            "Practice Status",
            "Success/Progress Rate",
            "Practice Task (English)",
            "Practice Status (English)",
            "Success/Progress Rate (English)",
        ]);
        for strategy in [
            DetectionStrategy::default(),
            DetectionStrategy::Convention(SchemaMapping::conventional()),
        ] {
            let schema = detect(&cols, &strategy);
            assert_eq!(schema.subject_names(), vec!["Math"]);
            assert_eq!(
                schema.issues,
                vec![SchemaIssue {
                    subject: "English".to_string(),
                    missing: vec![Role::CompletionDate],
                }]
            );
        }
    }

    #[test]
    fn unrelated_parenthesised_columns_stay_identity() {
        let cols = columns(&["Phone Number (mobile)", "Name"]);
        let schema = detect(&cols, &DetectionStrategy::default());
        assert!(schema.subjects.is_empty());
        assert!(schema.issues.is_empty());
        assert_eq!(schema.identity, cols);
    }

    #[test]
    fn diagnostic_columns_need_both_markers() {
        assert!(is_diagnostic_column("Diagnostic 3 - Accuracy"));
        assert!(is_diagnostic_column("diagnostic accuracy"));
        assert!(!is_diagnostic_column("Diagnostic 3 - Time"));
        assert!(!is_diagnostic_column("Accuracy"));
    }
}
