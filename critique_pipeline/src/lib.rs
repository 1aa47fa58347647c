mod config;

use log::{debug, info};
use regex::Regex;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime};

pub use crate::config::*;

// **** Loader ****

/// Column positions (in the original header) holding non-essential export
/// metadata. They are dropped before the header lookup, so a stray label in
/// one of them can never satisfy a required column.
const DROPPED_HEADER_COLUMNS: [usize; 6] = [4, 5, 6, 7, 12, 13];

const REQUIRED_COLUMNS: [&str; 7] = [
    "firstname",
    "lastname",
    "question",
    "responsedate",
    "curriculum",
    "responsetext",
    "responsecomments",
];

/// Text timestamp layouts seen in the exports, most common first.
const DATETIME_FORMATS: [&str; 3] = ["%m/%d/%Y %H:%M:%S", "%m/%d/%Y %H:%M", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: [&str; 2] = ["%m/%d/%Y", "%Y-%m-%d"];

static EMPTY_CELL: Cell = Cell::Empty;

/// Parses the raw worksheet into response records.
///
/// Returns the records in source order together with `initial_rows`, the
/// number of data rows before any cleaning.
pub fn load_records(sheet: &[Vec<Cell>]) -> Result<(Vec<ResponseRecord>, usize), LoadError> {
    if sheet.len() < EXPORT_HEADER_ROWS {
        return Err(LoadError::TruncatedExport { rows: sheet.len() });
    }
    let header = &sheet[EXPORT_HEADER_ROWS - 1];
    debug!("load_records: raw header: {:?}", header);

    let mut columns: HashMap<String, usize> = HashMap::new();
    for (idx, cell) in header.iter().enumerate() {
        if DROPPED_HEADER_COLUMNS.contains(&idx) {
            continue;
        }
        if let Some(name) = cell_text(cell) {
            columns.entry(normalize_header(&name)).or_insert(idx);
        }
    }
    debug!("load_records: normalized columns: {:?}", columns);

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|name| !columns.contains_key(**name))
        .map(|name| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns { missing });
    }

    let col = |name: &str| columns[name];
    let (c_first, c_last) = (col("firstname"), col("lastname"));
    let (c_date, c_curriculum) = (col("responsedate"), col("curriculum"));
    let (c_question, c_text, c_comments) =
        (col("question"), col("responsetext"), col("responsecomments"));

    let data_rows = &sheet[EXPORT_HEADER_ROWS..];
    let records: Vec<ResponseRecord> = data_rows
        .iter()
        .map(|row| ResponseRecord {
            first_name: cell_text(cell_at(row, c_first)).unwrap_or_default(),
            last_name: cell_text(cell_at(row, c_last)).unwrap_or_default(),
            response_date: cell_datetime(cell_at(row, c_date)),
            curriculum: cell_text(cell_at(row, c_curriculum)),
            question: cell_text(cell_at(row, c_question)),
            response_text: cell_text(cell_at(row, c_text)).unwrap_or_default(),
            response_comments: cell_text(cell_at(row, c_comments)).unwrap_or_default(),
        })
        .collect();

    info!("load_records: {} data rows", records.len());
    let initial_rows = records.len();
    Ok((records, initial_rows))
}

fn cell_at<'a>(row: &'a [Cell], idx: usize) -> &'a Cell {
    row.get(idx).unwrap_or(&EMPTY_CELL)
}

/// Header tokens are matched after removing all whitespace and lowercasing,
/// so "First Name " and "firstname" resolve to the same column.
fn normalize_header(token: &str) -> String {
    token
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
}

fn cell_text(cell: &Cell) -> Option<String> {
    match cell {
        Cell::Text(s) => Some(s.clone()),
        Cell::Number(x) => Some(format_number(*x)),
        Cell::DateTime(dt) => Some(dt.to_string()),
        Cell::Empty => None,
    }
}

/// Integral numbers render without a decimal point, so a numeric score cell
/// counts against the "1".."5" labels.
fn format_number(x: f64) -> String {
    if x.fract() == 0.0 && x.abs() < 1e15 {
        format!("{}", x as i64)
    } else {
        x.to_string()
    }
}

fn cell_datetime(cell: &Cell) -> Option<NaiveDateTime> {
    match cell {
        Cell::DateTime(dt) => Some(*dt),
        Cell::Text(s) => parse_datetime_text(s.trim()),
        _ => None,
    }
}

fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(text, fmt) {
            return d.and_hms_opt(0, 0, 0);
        }
    }
    None
}

// **** Deduplicator ****

/// The composite identity of one submission.
///
/// Missing components compare as normal key values: two records both lacking
/// a date (or a question) share a key and collapse into one. Replicated from
/// the legacy cleaning step.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
struct IdentityKey {
    first_name: String,
    last_name: String,
    question: Option<String>,
    response_date: Option<NaiveDateTime>,
}

impl ResponseRecord {
    fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            question: self.question.clone(),
            response_date: self.response_date,
        }
    }
}

/// Removes duplicate submissions, keeping one record per identity key.
///
/// Records are first stably sorted by curriculum, descending, so that among
/// duplicates the one with the lexicographically larger (typically non-null)
/// curriculum wins. The output keeps that sort order, not the source order.
pub fn deduplicate(records: Vec<ResponseRecord>) -> Vec<ResponseRecord> {
    let initial = records.len();
    let mut sorted = records;
    sorted.sort_by(|a, b| b.curriculum.cmp(&a.curriculum));
    let mut seen = HashSet::new();
    sorted.retain(|record| seen.insert(record.identity_key()));
    info!(
        "deduplicate: removed {} duplicate rows, {} rows left",
        initial - sorted.len(),
        sorted.len()
    );
    sorted
}

// **** Classifier ****

// The two multi-word curriculum patterns, with any run of characters between
// the fixed fragments. Kept verbatim from the legacy rule set, including the
// unescaped dot in "8.1".
static PILOT_DIFFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?i)pilot block difference.*block 8.1").unwrap());
static LOADMASTER_DIFFERENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("(?i)loadmaster.*block 8.1").unwrap());

fn contains_ci(text: &Option<String>, needle: &str) -> bool {
    match text {
        Some(s) => s.to_lowercase().contains(needle),
        None => false,
    }
}

fn curriculum_matches(record: &ResponseRecord, re: &Regex) -> bool {
    record
        .curriculum
        .as_deref()
        .map(|c| re.is_match(c))
        .unwrap_or(false)
}

impl ProgramBucket {
    /// Whether this record counts towards the bucket.
    ///
    /// One independent predicate per bucket: the buckets are not mutually
    /// exclusive, absent text never matches, and no predicate can fail.
    pub fn matches(&self, record: &ResponseRecord) -> bool {
        let knowledgeable = contains_ci(&record.question, "knowledgeable");
        match self {
            ProgramBucket::Pilot => record.response_text == "Pilot",
            ProgramBucket::Loadmaster => {
                record.response_text == "Loadmaster"
                    && !contains_ci(&record.curriculum, "engine ground")
            }
            ProgramBucket::Maintenance => {
                contains_ci(&record.curriculum, "engine ground") && knowledgeable
            }
            ProgramBucket::PilotDifference => {
                curriculum_matches(record, &PILOT_DIFFERENCE_RE) && knowledgeable
            }
            ProgramBucket::LoadmasterDifference => {
                curriculum_matches(record, &LOADMASTER_DIFFERENCE_RE) && knowledgeable
            }
            ProgramBucket::PilotRefresher => {
                contains_ci(&record.curriculum, "c-130j pilot refresher") && knowledgeable
            }
            ProgramBucket::LoadmasterRefresher => {
                contains_ci(&record.curriculum, "loadmaster refresher") && knowledgeable
            }
            ProgramBucket::Unknown => {
                record.curriculum.is_none() && contains_ci(&record.question, "overall")
            }
        }
    }
}

/// The three crew-position columns of the totals table.
pub const PROGRAM_TOTALS: [ProgramBucket; 3] = [
    ProgramBucket::Pilot,
    ProgramBucket::Loadmaster,
    ProgramBucket::Maintenance,
];

/// The six columns of the totals-by-course table.
pub const COURSE_TOTALS: [ProgramBucket; 6] = [
    ProgramBucket::PilotDifference,
    ProgramBucket::LoadmasterDifference,
    ProgramBucket::PilotRefresher,
    ProgramBucket::LoadmasterRefresher,
    ProgramBucket::Maintenance,
    ProgramBucket::Unknown,
];

/// Counts the records matching each bucket. A record matching several
/// buckets is counted in each of them.
pub fn bucket_counts(records: &[ResponseRecord], buckets: &[ProgramBucket]) -> Vec<BucketCount> {
    buckets
        .iter()
        .map(|bucket| BucketCount {
            bucket: *bucket,
            count: records.iter().filter(|r| bucket.matches(r)).count(),
        })
        .collect()
}

/// Records lacking a curriculum assignment on the crew-position question,
/// kept whole for manual compliance review.
pub fn no_course_records(records: &[ResponseRecord]) -> Vec<ResponseRecord> {
    records
        .iter()
        .filter(|r| r.curriculum.is_none() && contains_ci(&r.question, "identify"))
        .cloned()
        .collect()
}

// **** Aggregator ****

/// The two administrative questions handled as dedicated report sections
/// rather than regular per-question tables.
pub const CREW_POSITION_QUESTION: &str = "Identify your crew position:";
pub const OVERALL_QUESTION: &str = "Overall, this refresher course was:";

/// Builds the scorecard and comment table of every non-administrative
/// question, in first-appearance order.
pub fn question_tables(records: &[ResponseRecord]) -> Vec<QuestionTable> {
    let mut questions: Vec<&str> = Vec::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for record in records {
        if let Some(q) = record.question.as_deref() {
            if q != CREW_POSITION_QUESTION && q != OVERALL_QUESTION && seen.insert(q) {
                questions.push(q);
            }
        }
    }

    questions
        .iter()
        .map(|q| {
            let group: Vec<&ResponseRecord> = records
                .iter()
                .filter(|r| r.question.as_deref() == Some(*q))
                .collect();
            QuestionTable {
                question: q.to_string(),
                scorecard: scorecard(&group),
                comments: comment_rows(&group),
            }
        })
        .collect()
}

fn scorecard(group: &[&ResponseRecord]) -> Scorecard {
    let mut counts = [0usize; 5];
    for record in group {
        // Anything outside the five labels is left out of the scorecard.
        if let Some(pos) = SCORE_LABELS.iter().position(|l| *l == record.response_text) {
            counts[pos] += 1;
        }
    }
    Scorecard { counts }
}

fn comment_rows(group: &[&ResponseRecord]) -> Vec<CommentRecord> {
    let mut rows: Vec<CommentRecord> = group
        .iter()
        .filter(|r| !r.response_comments.trim().is_empty())
        .map(|r| CommentRecord {
            comments: r.response_comments.clone(),
            curriculum: r.curriculum.clone(),
            score: parse_score(&r.response_text),
        })
        .collect();
    // Stable: ties and the trailing non-numeric block keep insertion order.
    rows.sort_by(|a, b| compare_scores(a.score, b.score));
    rows
}

fn parse_score(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok()
}

/// Ascending by score, rows without a numeric score last.
fn compare_scores(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// The overall-rating answers. The free-text rating lives in the response
/// column, so it becomes the comment of the dedicated table.
pub fn overall_comments(records: &[ResponseRecord]) -> Vec<OverallComment> {
    records
        .iter()
        .filter(|r| r.question.as_deref() == Some(OVERALL_QUESTION))
        .map(|r| OverallComment {
            comment: r.response_text.clone(),
            curriculum: r.curriculum.clone(),
        })
        .filter(|c| {
            !(c.comment.trim().is_empty()
                && c.curriculum.as_deref().map_or(true, |s| s.trim().is_empty()))
        })
        .collect()
}

fn distinct_respondents(records: &[ResponseRecord]) -> usize {
    let respondents: HashSet<(&str, &str, Option<NaiveDateTime>)> = records
        .iter()
        .map(|r| (r.first_name.as_str(), r.last_name.as_str(), r.response_date))
        .collect();
    respondents.len()
}

// **** Pipeline ****

/// Runs the full cleaning and aggregation pass over a raw worksheet.
///
/// Deterministic: identical cells produce an identical `CritiqueData`.
/// Milestones are reported through `progress`, which lives for this run only.
pub fn run_pipeline(
    sheet: &[Vec<Cell>],
    progress: &mut dyn ProgressSink,
) -> Result<CritiqueData, LoadError> {
    let (records, initial_rows) = load_records(sheet)?;
    progress.event(PipelineEvent::Loaded { initial_rows });

    let cleaned = deduplicate(records);
    let cleaned_rows = cleaned.len();
    progress.event(PipelineEvent::Deduplicated {
        cleaned_rows,
        dropped: initial_rows - cleaned_rows,
    });

    let questions = question_tables(&cleaned);
    let no_course = no_course_records(&cleaned);
    progress.event(PipelineEvent::Aggregated {
        questions: questions.len(),
        no_course: no_course.len(),
    });

    Ok(CritiqueData {
        initial_rows,
        cleaned_rows,
        distinct_respondents: distinct_respondents(&cleaned),
        program_totals: bucket_counts(&cleaned, &PROGRAM_TOTALS),
        course_totals: bucket_counts(&cleaned, &COURSE_TOTALS),
        questions,
        overall_comments: overall_comments(&cleaned),
        no_course,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, day)
            .unwrap()
            .and_hms_opt(8, 30, 0)
            .unwrap()
    }

    fn record(
        first: &str,
        question: &str,
        curriculum: Option<&str>,
        response_text: &str,
    ) -> ResponseRecord {
        ResponseRecord {
            first_name: first.to_string(),
            last_name: "Smith".to_string(),
            response_date: Some(date(1)),
            curriculum: curriculum.map(|c| c.to_string()),
            question: Some(question.to_string()),
            response_text: response_text.to_string(),
            response_comments: String::new(),
        }
    }

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    /// A sheet in the fixed export layout: four banner rows, the header, then
    /// the given data rows. Required columns sit at indices 0-3 and 8-10; the
    /// dropped positions 4-7 and 12-13 hold session metadata.
    fn export_sheet(data_rows: Vec<Vec<Cell>>) -> Vec<Vec<Cell>> {
        let mut sheet = vec![
            vec![text("Critique Export")],
            vec![],
            vec![text("Generated by the LMS")],
            vec![],
            vec![
                text("First Name"),
                text("Last Name"),
                text("Response Date"),
                text("Curriculum"),
                text("Session Id"),
                text("Location"),
                text("Instructor"),
                text("Course Code"),
                text("Question"),
                text("Response Text"),
                text("Response Comments"),
                text("Response Id"),
                text("Export Tag"),
                text("Export Batch"),
            ],
        ];
        sheet.extend(data_rows);
        sheet
    }

    fn data_row(
        first: &str,
        last: &str,
        d: &str,
        curriculum: &str,
        question: &str,
        score: &str,
        comments: &str,
    ) -> Vec<Cell> {
        let curriculum = if curriculum.is_empty() {
            Cell::Empty
        } else {
            text(curriculum)
        };
        let comments = if comments.is_empty() {
            Cell::Empty
        } else {
            text(comments)
        };
        vec![
            text(first),
            text(last),
            text(d),
            curriculum,
            text("ignored"),
            text("ignored"),
            text("ignored"),
            text("ignored"),
            text(question),
            text(score),
            comments,
            text("r-1"),
            text("ignored"),
            text("ignored"),
        ]
    }

    const KNOWLEDGEABLE_Q: &str = "The instructor was knowledgeable in the subject matter:";

    #[test]
    fn loader_normalizes_header_and_counts_rows() {
        let sheet = export_sheet(vec![
            data_row(
                "Ann",
                "Smith",
                "06/01/2025 08:30:00",
                "C-130J Pilot Refresher",
                KNOWLEDGEABLE_Q,
                "5",
                "",
            ),
            data_row("Bob", "Jones", "06/02/2025", "", KNOWLEDGEABLE_Q, "4", "Good course"),
        ]);
        let (records, initial_rows) = load_records(&sheet).unwrap();
        assert_eq!(initial_rows, 2);
        assert_eq!(records[0].first_name, "Ann");
        assert_eq!(records[0].response_date, Some(date(1)));
        assert_eq!(
            records[1].response_date,
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap().and_hms_opt(0, 0, 0)
        );
        assert_eq!(records[1].curriculum, None);
        assert_eq!(records[1].response_comments, "Good course");
    }

    #[test]
    fn loader_rejects_truncated_export() {
        let sheet = vec![vec![text("Critique Export")]; 3];
        assert_eq!(
            load_records(&sheet),
            Err(LoadError::TruncatedExport { rows: 3 })
        );
    }

    #[test]
    fn loader_reports_missing_columns() {
        let mut sheet = export_sheet(vec![]);
        sheet[4][8] = text("Prompt");
        match load_records(&sheet) {
            Err(LoadError::MissingColumns { missing }) => {
                assert_eq!(missing, vec!["question".to_string()]);
            }
            other => panic!("expected MissingColumns, got {:?}", other),
        }
    }

    #[test]
    fn dropped_columns_never_provide_required_headers() {
        let mut sheet = export_sheet(vec![]);
        // A "Question" label in a dropped metadata slot must not count.
        sheet[4][8] = text("Prompt");
        sheet[4][5] = text("Question");
        assert!(matches!(
            load_records(&sheet),
            Err(LoadError::MissingColumns { .. })
        ));
    }

    #[test]
    fn malformed_dates_become_none() {
        let sheet = export_sheet(vec![data_row(
            "Ann",
            "Smith",
            "yesterday-ish",
            "Course A",
            KNOWLEDGEABLE_Q,
            "5",
            "",
        )]);
        let (records, _) = load_records(&sheet).unwrap();
        assert_eq!(records[0].response_date, None);
    }

    #[test]
    fn numeric_score_cells_keep_their_label() {
        let mut row = data_row("Ann", "Smith", "06/01/2025", "Course A", KNOWLEDGEABLE_Q, "", "");
        row[9] = Cell::Number(4.0);
        let (records, _) = load_records(&export_sheet(vec![row])).unwrap();
        assert_eq!(records[0].response_text, "4");
    }

    #[test]
    fn rows_differing_only_in_dropped_columns_collapse() {
        let row_a = data_row("Ann", "Smith", "06/01/2025", "Course A", KNOWLEDGEABLE_Q, "5", "");
        let mut row_b = row_a.clone();
        row_b[5] = text("another location");
        let (records, initial_rows) = load_records(&export_sheet(vec![row_a, row_b])).unwrap();
        let cleaned = deduplicate(records);
        assert_eq!(initial_rows, 2);
        assert_eq!(cleaned.len(), 1);
    }

    #[test]
    fn dedup_keeps_the_record_with_curriculum() {
        let with_curriculum = record("Ann", KNOWLEDGEABLE_Q, Some("ValueA"), "5");
        let without = record("Ann", KNOWLEDGEABLE_Q, None, "3");
        let cleaned = deduplicate(vec![without, with_curriculum]);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].curriculum.as_deref(), Some("ValueA"));
        assert_eq!(cleaned[0].response_text, "5");
    }

    #[test]
    fn dedup_is_idempotent() {
        let records = vec![
            record("Ann", KNOWLEDGEABLE_Q, Some("Course A"), "5"),
            record("Ann", KNOWLEDGEABLE_Q, None, "3"),
            record("Bob", KNOWLEDGEABLE_Q, Some("Course B"), "4"),
        ];
        let once = deduplicate(records);
        let twice = deduplicate(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_key_components_still_collapse() {
        let mut a = record("Ann", KNOWLEDGEABLE_Q, Some("Course A"), "5");
        a.question = None;
        a.response_date = None;
        let mut b = record("Ann", KNOWLEDGEABLE_Q, None, "2");
        b.question = None;
        b.response_date = None;
        let cleaned = deduplicate(vec![b, a]);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].curriculum.as_deref(), Some("Course A"));
    }

    #[test]
    fn dedup_orders_by_curriculum_descending() {
        let records = vec![
            record("Ann", KNOWLEDGEABLE_Q, Some("Alpha"), "5"),
            record("Bob", KNOWLEDGEABLE_Q, Some("Charlie"), "5"),
            record("Cal", KNOWLEDGEABLE_Q, None, "5"),
            record("Dee", KNOWLEDGEABLE_Q, Some("Bravo"), "5"),
        ];
        let cleaned = deduplicate(records);
        let curricula: Vec<Option<&str>> =
            cleaned.iter().map(|r| r.curriculum.as_deref()).collect();
        assert_eq!(
            curricula,
            vec![Some("Charlie"), Some("Bravo"), Some("Alpha"), None]
        );
    }

    #[test]
    fn cleaned_never_exceeds_initial() {
        let records = vec![
            record("Ann", KNOWLEDGEABLE_Q, Some("Course A"), "5"),
            record("Ann", KNOWLEDGEABLE_Q, Some("Course A"), "5"),
            record("Bob", KNOWLEDGEABLE_Q, Some("Course A"), "4"),
        ];
        let initial = records.len();
        assert!(deduplicate(records).len() <= initial);
    }

    fn all_buckets() -> Vec<ProgramBucket> {
        vec![
            ProgramBucket::Pilot,
            ProgramBucket::Loadmaster,
            ProgramBucket::Maintenance,
            ProgramBucket::PilotDifference,
            ProgramBucket::LoadmasterDifference,
            ProgramBucket::PilotRefresher,
            ProgramBucket::LoadmasterRefresher,
            ProgramBucket::Unknown,
        ]
    }

    #[test]
    fn pilot_bucket_counts_once_and_nowhere_else() {
        let records = vec![record(
            "Ann",
            CREW_POSITION_QUESTION,
            Some("General Course"),
            "Pilot",
        )];
        for bc in bucket_counts(&records, &all_buckets()) {
            let expected = usize::from(bc.bucket == ProgramBucket::Pilot);
            assert_eq!(bc.count, expected, "bucket {:?}", bc.bucket);
        }
    }

    #[test]
    fn loadmaster_bucket_excludes_engine_ground() {
        let r = record(
            "Ann",
            KNOWLEDGEABLE_Q,
            Some("C-130J Engine Ground Operations"),
            "Loadmaster",
        );
        assert!(!ProgramBucket::Loadmaster.matches(&r));
        assert!(ProgramBucket::Maintenance.matches(&r));
    }

    #[test]
    fn difference_course_patterns_span_gaps() {
        let pdc = record(
            "Ann",
            KNOWLEDGEABLE_Q,
            Some("C-130J Pilot Block Difference Course, Block 8.1"),
            "5",
        );
        assert!(ProgramBucket::PilotDifference.matches(&pdc));
        assert!(!ProgramBucket::LoadmasterDifference.matches(&pdc));

        let ldc = record(
            "Ann",
            KNOWLEDGEABLE_Q,
            Some("C-130J LOADMASTER Difference Course, Block 8.1"),
            "5",
        );
        assert!(ProgramBucket::LoadmasterDifference.matches(&ldc));
        assert!(!ProgramBucket::PilotDifference.matches(&ldc));

        // Without the knowledgeable question, neither predicate holds.
        let off_question = record(
            "Ann",
            "Facilities were adequate:",
            Some("C-130J Pilot Block Difference Course, Block 8.1"),
            "5",
        );
        assert!(!ProgramBucket::PilotDifference.matches(&off_question));
    }

    #[test]
    fn refresher_buckets_match_case_insensitively() {
        let psr = record("Ann", KNOWLEDGEABLE_Q, Some("c-130j pilot refresher"), "5");
        assert!(ProgramBucket::PilotRefresher.matches(&psr));
        let lrt = record("Ann", KNOWLEDGEABLE_Q, Some("Loadmaster Refresher Training"), "5");
        assert!(ProgramBucket::LoadmasterRefresher.matches(&lrt));
    }

    #[test]
    fn unknown_bucket_requires_missing_curriculum() {
        let unknown = record("Ann", OVERALL_QUESTION, None, "Excellent");
        assert!(ProgramBucket::Unknown.matches(&unknown));
        let assigned = record("Ann", OVERALL_QUESTION, Some("Course A"), "Excellent");
        assert!(!ProgramBucket::Unknown.matches(&assigned));
    }

    #[test]
    fn no_course_subset_collects_identify_rows_once() {
        let stray = record("Ann", CREW_POSITION_QUESTION, None, "Pilot");
        let assigned = record("Bob", CREW_POSITION_QUESTION, Some("Course A"), "Pilot");
        let records = vec![stray.clone(), assigned];
        let subset = no_course_records(&records);
        assert_eq!(subset, vec![stray.clone()]);
        // The stray record is not picked up by the unknown-course count.
        assert!(!ProgramBucket::Unknown.matches(&stray));
    }

    #[test]
    fn scorecard_counts_only_valid_labels() {
        let records = vec![
            record("Ann", KNOWLEDGEABLE_Q, Some("Course A"), "1"),
            record("Bob", KNOWLEDGEABLE_Q, Some("Course A"), "3"),
            record("Cal", KNOWLEDGEABLE_Q, Some("Course A"), "3"),
            record("Dee", KNOWLEDGEABLE_Q, Some("Course A"), "7"),
            record("Eve", KNOWLEDGEABLE_Q, Some("Course A"), "Pilot"),
        ];
        let tables = question_tables(&records);
        assert_eq!(tables.len(), 1);
        let scorecard = &tables[0].scorecard;
        assert_eq!(scorecard.counts, [1, 0, 2, 0, 0]);
        assert_eq!(scorecard.total(), 3);
    }

    #[test]
    fn comments_sort_by_score_with_non_numeric_last() {
        let mut first = record("Ann", KNOWLEDGEABLE_Q, Some("Course A"), "4");
        first.response_comments = "solid".to_string();
        let mut second = record("Bob", KNOWLEDGEABLE_Q, Some("Course A"), "2");
        second.response_comments = "weak".to_string();
        let mut third = record("Cal", KNOWLEDGEABLE_Q, Some("Course A"), "N/A");
        third.response_comments = "no score given".to_string();
        let mut blank = record("Dee", KNOWLEDGEABLE_Q, Some("Course A"), "5");
        blank.response_comments = "   ".to_string();

        let tables = question_tables(&[first, second, third, blank]);
        let comments = &tables[0].comments;
        assert_eq!(comments.len(), 3);
        assert_eq!(comments[0].comments, "weak");
        assert_eq!(comments[0].score, Some(2.0));
        assert_eq!(comments[1].comments, "solid");
        assert_eq!(comments[2].comments, "no score given");
        assert_eq!(comments[2].score, None);
    }

    #[test]
    fn admin_questions_get_no_regular_table() {
        let records = vec![
            record("Ann", CREW_POSITION_QUESTION, Some("Course A"), "Pilot"),
            record("Ann", OVERALL_QUESTION, Some("Course A"), "Excellent"),
            record("Ann", KNOWLEDGEABLE_Q, Some("Course A"), "5"),
        ];
        let tables = question_tables(&records);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].question, KNOWLEDGEABLE_Q);
    }

    #[test]
    fn overall_comments_use_response_text() {
        let rated = record("Ann", OVERALL_QUESTION, Some("Course A"), "Outstanding");
        let mut empty = record("Bob", OVERALL_QUESTION, None, "");
        empty.response_text = String::new();
        let rows = overall_comments(&[rated, empty]);
        assert_eq!(
            rows,
            vec![OverallComment {
                comment: "Outstanding".to_string(),
                curriculum: Some("Course A".to_string()),
            }]
        );
    }

    struct RecordingSink(Vec<PipelineEvent>);

    impl ProgressSink for RecordingSink {
        fn event(&mut self, event: PipelineEvent) {
            self.0.push(event);
        }
    }

    #[test]
    fn pipeline_reports_milestones_and_counts() {
        let sheet = export_sheet(vec![
            data_row("Ann", "Smith", "06/01/2025", "Course A", KNOWLEDGEABLE_Q, "5", ""),
            data_row("Ann", "Smith", "06/01/2025", "", KNOWLEDGEABLE_Q, "5", ""),
            data_row("Bob", "Jones", "06/02/2025", "Course A", KNOWLEDGEABLE_Q, "4", "ok"),
        ]);
        let mut sink = RecordingSink(Vec::new());
        let data = run_pipeline(&sheet, &mut sink).unwrap();

        assert_eq!(data.initial_rows, 3);
        assert_eq!(data.cleaned_rows, 2);
        assert_eq!(data.distinct_respondents, 2);
        assert_eq!(data.questions.len(), 1);
        assert_eq!(
            sink.0,
            vec![
                PipelineEvent::Loaded { initial_rows: 3 },
                PipelineEvent::Deduplicated {
                    cleaned_rows: 2,
                    dropped: 1
                },
                PipelineEvent::Aggregated {
                    questions: 1,
                    no_course: 0
                },
            ]
        );
    }

    #[test]
    fn no_two_cleaned_records_share_an_identity_key() {
        let records = vec![
            record("Ann", KNOWLEDGEABLE_Q, Some("Course A"), "5"),
            record("Ann", KNOWLEDGEABLE_Q, Some("Course B"), "4"),
            record("Ann", CREW_POSITION_QUESTION, Some("Course A"), "Pilot"),
            record("Bob", KNOWLEDGEABLE_Q, Some("Course A"), "3"),
        ];
        let cleaned = deduplicate(records);
        let keys: HashSet<_> = cleaned.iter().map(|r| r.identity_key()).collect();
        assert_eq!(keys.len(), cleaned.len());
    }
}
