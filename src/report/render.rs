use std::fmt::Write;

use chrono::NaiveDate;

use critique_pipeline::{
    BucketCount, CommentRecord, CritiqueData, OverallComment, ResponseRecord, Scorecard,
    OVERALL_QUESTION, SCORE_LABELS,
};

/// Comment rows scoring below this render in the alarm style. Fixed contract
/// of the report, not configurable.
const ALARM_THRESHOLD: f64 = 3.0;

/// Width, in characters, of a full-scale chart bar.
const BAR_WIDTH: usize = 40;

/// Renders the whole report document in Markdown.
///
/// Depends only on the aggregated data and the generation date, so two runs
/// over the same export produce the same document.
pub fn render_report(data: &CritiqueData, generated_on: NaiveDate) -> String {
    let mut out = String::new();

    title_block(&mut out, data, generated_on);
    student_overview(&mut out, &data.program_totals);
    course_overview(&mut out, &data.course_totals);
    unknown_course_table(&mut out, &data.no_course);
    overall_table(&mut out, &data.overall_comments);

    for table in &data.questions {
        let _ = writeln!(out, "\n---\n");
        let _ = writeln!(out, "## {}", table.question);
        let _ = writeln!(out);
        scorecard_chart(&mut out, &table.scorecard);
        comments_table(&mut out, &table.comments);
    }

    out
}

fn title_block(out: &mut String, data: &CritiqueData, generated_on: NaiveDate) {
    let _ = writeln!(out, "# Critique Results - JMATS Training");
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "This report consolidates the critique data exported from lms.c130j.com. It provides \
monthly or quarterly insight to instructors, leadership and government stakeholders to \
capitalize on training opportunities at Dyess JMATS. During cleaning, duplicated submissions \
are removed and the remaining responses are centralized as one clean data set."
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "- Data was downloaded on: {}", generated_on);
    let _ = writeln!(out, "- Initial record size: {}", data.initial_rows);
    let _ = writeln!(out, "- Cleaned record size: {}", data.cleaned_rows);
    let _ = writeln!(out, "- Distinct respondents: {}", data.distinct_respondents);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Questions or clarifications may be referred to Site Lead/Training."
    );
}

fn student_overview(out: &mut String, totals: &[BucketCount]) {
    let _ = writeln!(out, "\n## Student Overview");
    let _ = writeln!(out);
    let _ = writeln!(out, "This data is pulled directly from the LMS.");
    let _ = writeln!(out);
    let total: usize = totals.iter().map(|t| t.count).sum();
    let _ = writeln!(out, "| Category | Count | Share |");
    let _ = writeln!(out, "|---|---:|---:|");
    for t in totals {
        let share = if total > 0 {
            t.count as f64 * 100.0 / total as f64
        } else {
            0.0
        };
        let _ = writeln!(out, "| {} | {} | {:.1}% |", t.bucket.label(), t.count, share);
    }
}

fn course_overview(out: &mut String, totals: &[BucketCount]) {
    let _ = writeln!(out, "\n## Course Overview");
    let _ = writeln!(out);
    let max = totals.iter().map(|t| t.count).max().unwrap_or(0);
    let _ = writeln!(out, "```text");
    for t in totals {
        let _ = writeln!(
            out,
            "{:<8} | {} {}",
            t.bucket.label(),
            bar(t.count, max),
            t.count
        );
    }
    let _ = writeln!(out, "```");
}

fn unknown_course_table(out: &mut String, no_course: &[ResponseRecord]) {
    let _ = writeln!(out, "\n### Unknown Course Entries");
    let _ = writeln!(out);
    if no_course.is_empty() {
        let _ = writeln!(out, "No unknown course entries found.");
        return;
    }
    let _ = writeln!(out, "| Firstname | Lastname | Responsetext |");
    let _ = writeln!(out, "|---|---|---|");
    for r in no_course {
        let _ = writeln!(
            out,
            "| {} | {} | {} |",
            table_cell(&r.first_name),
            table_cell(&r.last_name),
            table_cell(&r.response_text)
        );
    }
}

fn overall_table(out: &mut String, rows: &[OverallComment]) {
    let _ = writeln!(out, "\n## {}", OVERALL_QUESTION);
    let _ = writeln!(out);
    if rows.is_empty() {
        let _ = writeln!(out, "No comments recorded.");
        return;
    }
    let _ = writeln!(out, "| Comments | Curriculum |");
    let _ = writeln!(out, "|---|---|");
    for row in rows {
        let _ = writeln!(
            out,
            "| {} | {} |",
            table_cell(&row.comment),
            table_cell(row.curriculum.as_deref().unwrap_or(""))
        );
    }
}

fn scorecard_chart(out: &mut String, scorecard: &Scorecard) {
    let max = scorecard.counts.iter().copied().max().unwrap_or(0);
    let _ = writeln!(out, "```text");
    for (label, count) in SCORE_LABELS.iter().zip(scorecard.counts.iter()) {
        let _ = writeln!(out, "{} | {} {}", label, bar(*count, max), count);
    }
    let _ = writeln!(out, "```");
}

fn comments_table(out: &mut String, comments: &[CommentRecord]) {
    let _ = writeln!(out, "\n### Comments");
    let _ = writeln!(out);
    if comments.is_empty() {
        let _ = writeln!(out, "No comments recorded.");
        return;
    }
    let _ = writeln!(out, "| Comments | Curriculum | Score |");
    let _ = writeln!(out, "|---|---|---:|");
    for row in comments {
        let alarm = row.score.map(|s| s < ALARM_THRESHOLD).unwrap_or(false);
        let comment = table_cell(&row.comments);
        let curriculum = table_cell(row.curriculum.as_deref().unwrap_or(""));
        let score = format_score(row.score);
        if alarm {
            let _ = writeln!(
                out,
                "| **{}** ⚠️ Score below 3 | {} | **{}** |",
                comment,
                emphasized(&curriculum),
                score
            );
        } else {
            let _ = writeln!(out, "| {} | {} | {} |", comment, curriculum, score);
        }
    }
}

fn bar(count: usize, max: usize) -> String {
    if count == 0 || max == 0 {
        return String::new();
    }
    // Ceiling scale: small non-zero counts stay visible.
    let width = (count * BAR_WIDTH + max - 1) / max;
    "█".repeat(width)
}

fn format_score(score: Option<f64>) -> String {
    match score {
        Some(s) if s.fract() == 0.0 => format!("{}", s as i64),
        Some(s) => format!("{}", s),
        None => String::new(),
    }
}

fn emphasized(cell: &str) -> String {
    if cell.is_empty() {
        String::new()
    } else {
        format!("**{}**", cell)
    }
}

/// Markdown table cells cannot hold raw pipes or line breaks.
fn table_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}
