use log::{info, warn};

use critique_pipeline::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;

use crate::args::Args;

pub mod io_excel;
pub mod render;

/// Milestones are appended here for post-hoc analysis, next to the process.
const MILESTONE_LOG: &str = "critrep.log";

#[derive(Debug, Snafu)]
pub enum ReportError {
    #[snafu(display("Error opening workbook {path}"))]
    OpeningWorkbook {
        source: calamine::Error,
        path: String,
    },
    #[snafu(display("The input file {path} is not one of the supported export formats (.xls, .xlsx)"))]
    UnsupportedFormat { path: String },
    #[snafu(display("No worksheet named {name} in {path}"))]
    MissingWorksheet { name: String, path: String },
    #[snafu(display("The workbook {path} contains no worksheets"))]
    EmptyWorkbook { path: String },
    #[snafu(display("The export could not be parsed: {source}"))]
    MalformedExport { source: LoadError },
    #[snafu(display("Error writing the report to {path}"))]
    WritingReport {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing the summary to {path}"))]
    WritingSummary {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    SerializingSummary { source: serde_json::Error },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error + Send + Sync>, Some)))]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

pub type ReportResult<T> = Result<T, ReportError>;

/// What the interactive surface receives on success.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub initial_rows: usize,
    pub cleaned_rows: usize,
    pub output_path: String,
}

/// A sink forwarding pipeline milestones to the interaction thread.
struct ChannelProgress {
    sender: mpsc::Sender<PipelineEvent>,
}

impl ProgressSink for ChannelProgress {
    fn event(&mut self, event: PipelineEvent) {
        // The receiving side may already be gone; milestones are advisory.
        let _ = self.sender.send(event);
    }
}

/// Appends timestamped milestone lines to the persistent log file.
struct MilestoneLog {
    file: Option<fs::File>,
}

impl MilestoneLog {
    fn open() -> MilestoneLog {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(MILESTONE_LOG);
        if let Err(e) = &file {
            // Log file trouble must never take down a report run.
            warn!("cannot open {}: {}", MILESTONE_LOG, e);
        }
        MilestoneLog { file: file.ok() }
    }

    fn note(&mut self, line: &str) {
        if let Some(f) = &mut self.file {
            let _ = writeln!(
                f,
                "{} - INFO - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                line
            );
        }
    }
}

/// Runs the whole report generation off the calling thread.
///
/// The pipeline itself is synchronous (`run_report`); this wrapper only owns
/// the thread, the progress channel and the milestone log, so the caller
/// stays responsive while the run is in flight.
pub fn generate_report(args: &Args) -> ReportResult<RunOutcome> {
    let mut milestones = MilestoneLog::open();
    milestones.note(&format!("processing {}", args.input));

    let (tx, rx) = mpsc::channel::<PipelineEvent>();
    let worker_args = args.clone();
    let handle = thread::spawn(move || {
        run_report(&worker_args, ChannelProgress { sender: tx })
    });

    // The worker owns the sending half; the loop ends when it finishes.
    for event in rx {
        info!("{}", event);
        milestones.note(&event.to_string());
    }

    match handle.join() {
        Ok(res) => {
            match &res {
                Ok(outcome) => milestones.note(&format!("exported to {}", outcome.output_path)),
                Err(e) => milestones.note(&format!("run failed: {}", e)),
            }
            res
        }
        Err(_) => whatever!("the report worker thread panicked"),
    }
}

/// The synchronous end-to-end run: read, clean, aggregate, render, write.
pub fn run_report(args: &Args, mut progress: impl ProgressSink) -> ReportResult<RunOutcome> {
    let sheet = io_excel::read_survey_sheet(&args.input, args.excel_worksheet_name.as_deref())?;
    let data = run_pipeline(&sheet, &mut progress).context(MalformedExportSnafu)?;

    let generated_on = Local::now().date_naive();
    let document = render::render_report(&data, generated_on);
    write_atomically(Path::new(&args.out), &document).context(WritingReportSnafu {
        path: args.out.clone(),
    })?;

    if let Some(summary_path) = &args.summary {
        write_summary(summary_path, &args.input, &data, generated_on)?;
    }

    Ok(RunOutcome {
        initial_rows: data.initial_rows,
        cleaned_rows: data.cleaned_rows,
        output_path: args.out.clone(),
    })
}

/// The document only appears at the destination once fully written: content
/// goes to a temporary sibling first and is renamed into place on success.
fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp = PathBuf::from(tmp_name);
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

#[derive(Serialize, Debug, Clone)]
struct SummaryMeta {
    #[serde(rename = "generatedOn")]
    generated_on: String,
    #[serde(rename = "sourceFile")]
    source_file: String,
    #[serde(rename = "initialRows")]
    initial_rows: usize,
    #[serde(rename = "cleanedRows")]
    cleaned_rows: usize,
    #[serde(rename = "distinctRespondents")]
    distinct_respondents: usize,
}

fn build_summary_js(source_file: &str, data: &CritiqueData, generated_on: NaiveDate) -> JSValue {
    let meta = SummaryMeta {
        generated_on: generated_on.to_string(),
        source_file: source_file.to_string(),
        initial_rows: data.initial_rows,
        cleaned_rows: data.cleaned_rows,
        distinct_respondents: data.distinct_respondents,
    };

    let mut totals: JSMap<String, JSValue> = JSMap::new();
    for t in &data.program_totals {
        totals.insert(t.bucket.label().to_string(), json!(t.count));
    }
    let mut by_course: JSMap<String, JSValue> = JSMap::new();
    for t in &data.course_totals {
        by_course.insert(t.bucket.label().to_string(), json!(t.count));
    }

    let questions: Vec<JSValue> = data
        .questions
        .iter()
        .map(|q| {
            json!({
                "question": q.question,
                "scorecard": q.scorecard.counts.to_vec(),
                "comments": q.comments.len(),
            })
        })
        .collect();

    json!({
        "meta": meta,
        "totals": totals,
        "totalsByCourse": by_course,
        "questions": questions,
        "noCourseEntries": data.no_course.len(),
    })
}

fn write_summary(
    path: &str,
    source_file: &str,
    data: &CritiqueData,
    generated_on: NaiveDate,
) -> ReportResult<()> {
    let js = build_summary_js(source_file, data, generated_on);
    let pretty = serde_json::to_string_pretty(&js).context(SerializingSummarySnafu {})?;
    if path == "stdout" {
        println!("{}", pretty);
    } else {
        write_atomically(Path::new(path), &pretty).context(WritingSummarySnafu { path })?;
    }
    Ok(())
}
