// ********* Input data structures ***********

use std::error::Error;
use std::fmt::Display;

use chrono::NaiveDateTime;

/// Fixed boilerplate rows at the top of every export: four banner rows,
/// then the header row itself.
pub const EXPORT_HEADER_ROWS: usize = 5;

/// One worksheet cell, as handed over by the ingestion layer.
///
/// The pipeline is format independent: whatever reads the export file is in
/// charge of mapping its own cell representation to this one.
#[derive(PartialEq, Debug, Clone)]
pub enum Cell {
    Text(String),
    Number(f64),
    /// A date-formatted cell, already decoded from the storage representation.
    DateTime(NaiveDateTime),
    Empty,
}

/// One survey response row, as loaded from the export.
///
/// Name cells are kept verbatim (an absent cell becomes an empty string);
/// the nullable fields stay `None` when the cell is missing or malformed.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ResponseRecord {
    pub first_name: String,
    pub last_name: String,
    pub response_date: Option<NaiveDateTime>,
    pub curriculum: Option<String>,
    pub question: Option<String>,
    pub response_text: String,
    pub response_comments: String,
}

// ******** Output data structures *********

/// The program buckets a cleaned record can be counted under.
///
/// Buckets are independent predicates, not a partition: a record may match
/// zero, one or several of them.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ProgramBucket {
    Pilot,
    Loadmaster,
    Maintenance,
    PilotDifference,
    LoadmasterDifference,
    PilotRefresher,
    LoadmasterRefresher,
    Unknown,
}

impl ProgramBucket {
    /// The column label used in the report tables.
    pub fn label(&self) -> &'static str {
        match self {
            ProgramBucket::Pilot => "Pilots",
            ProgramBucket::Loadmaster => "Loadmasters",
            ProgramBucket::Maintenance => "MX",
            ProgramBucket::PilotDifference => "PDC",
            ProgramBucket::LoadmasterDifference => "LDC",
            ProgramBucket::PilotRefresher => "PSR",
            ProgramBucket::LoadmasterRefresher => "LRT",
            ProgramBucket::Unknown => "Unknown",
        }
    }
}

/// One cell of a totals table.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct BucketCount {
    pub bucket: ProgramBucket,
    pub count: usize,
}

/// The five valid score labels, in display order.
pub const SCORE_LABELS: [&str; 5] = ["1", "2", "3", "4", "5"];

/// Frequency of each valid score for one question.
///
/// `counts[i]` holds the responses with score label `SCORE_LABELS[i]`.
/// Buckets with no response stay at zero; responses outside the five labels
/// are not counted at all.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct Scorecard {
    pub counts: [usize; 5],
}

impl Scorecard {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// One annotated comment row of a question table.
#[derive(PartialEq, Debug, Clone)]
pub struct CommentRecord {
    pub comments: String,
    pub curriculum: Option<String>,
    /// The response score parsed as a number, `None` when not numeric.
    pub score: Option<f64>,
}

/// One row of the dedicated overall-rating table. That question stores its
/// free-text answer in the response column, not in the comments column.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct OverallComment {
    pub comment: String,
    pub curriculum: Option<String>,
}

/// Scorecard and comment table of one non-administrative question.
#[derive(PartialEq, Debug, Clone)]
pub struct QuestionTable {
    pub question: String,
    pub scorecard: Scorecard,
    pub comments: Vec<CommentRecord>,
}

/// Everything the report needs, computed in one pass over the export.
#[derive(PartialEq, Debug, Clone)]
pub struct CritiqueData {
    /// Data rows in the export, boilerplate and header excluded.
    pub initial_rows: usize,
    /// Rows left after deduplication.
    pub cleaned_rows: usize,
    /// Distinct (first name, last name, response date) combinations.
    pub distinct_respondents: usize,
    pub program_totals: Vec<BucketCount>,
    pub course_totals: Vec<BucketCount>,
    pub questions: Vec<QuestionTable>,
    pub overall_comments: Vec<OverallComment>,
    /// Cleaned records with no curriculum assignment, kept whole for manual review.
    pub no_course: Vec<ResponseRecord>,
}

// ******** Progress reporting *********

/// Milestones emitted while the pipeline runs.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum PipelineEvent {
    Loaded { initial_rows: usize },
    Deduplicated { cleaned_rows: usize, dropped: usize },
    Aggregated { questions: usize, no_course: usize },
}

impl Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::Loaded { initial_rows } => {
                write!(f, "loaded {} response rows", initial_rows)
            }
            PipelineEvent::Deduplicated {
                cleaned_rows,
                dropped,
            } => write!(
                f,
                "removed duplicates; {} rows dropped, {} rows kept",
                dropped, cleaned_rows
            ),
            PipelineEvent::Aggregated {
                questions,
                no_course,
            } => write!(
                f,
                "aggregated {} questions, {} records without curriculum",
                questions, no_course
            ),
        }
    }
}

/// Where pipeline milestones are delivered.
///
/// The sink is handed in by the caller and lives for one run; the pipeline
/// keeps no ambient logging state of its own.
pub trait ProgressSink {
    fn event(&mut self, event: PipelineEvent);
}

/// A sink that discards every milestone.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&mut self, _event: PipelineEvent) {}
}

// ******** Errors *********

/// Errors that prevent the export from being loaded at all.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum LoadError {
    /// The sheet does not even contain the fixed boilerplate and header rows.
    TruncatedExport { rows: usize },
    /// Required columns absent from the normalized header.
    MissingColumns { missing: Vec<String> },
}

impl Error for LoadError {}

impl Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::TruncatedExport { rows } => write!(
                f,
                "the export contains {} rows, less than the fixed {}-row header block",
                rows, EXPORT_HEADER_ROWS
            ),
            LoadError::MissingColumns { missing } => write!(
                f,
                "required columns are missing from the export header: {}",
                missing.join(", ")
            ),
        }
    }
}
