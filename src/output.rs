use std::io::Write;

use serde::Serialize;

use crate::cli::OutputFormat;
use crate::error::Result;
use crate::eval::SummaryEntry;
use crate::model::{EvaluationStatus, Report};

const RULE: &str = "============================================================";

/// Everything a search produces, rendered once before any chat starts.
pub struct RunOutput<'a> {
    pub job_description: &'a str,
    pub indexed: usize,
    pub skipped: usize,
    pub match_reason: &'a str,
    /// `None` when the summary report was skipped.
    pub summary: Option<&'a [SummaryEntry]>,
    pub report: Option<&'a Report>,
}

pub fn print_run<W: Write>(out: &mut W, format: OutputFormat, run: &RunOutput<'_>) -> Result<()> {
    match format {
        OutputFormat::Text => print_text(out, run),
        OutputFormat::Json => print_json(out, run),
    }
}

fn print_text<W: Write>(out: &mut W, run: &RunOutput<'_>) -> Result<()> {
    writeln!(
        out,
        "Indexed {} resume(s) ({} skipped)",
        run.indexed, run.skipped
    )?;
    writeln!(out)?;

    if let Some(entries) = run.summary {
        writeln!(out, "{RULE}")?;
        writeln!(out, "CANDIDATE SUMMARY REPORT")?;
        writeln!(out, "{RULE}")?;
        writeln!(out, "Job description: {}", preview(run.job_description, 100))?;
        writeln!(out, "Top candidates: {}", entries.len())?;
        writeln!(out)?;
        for entry in entries {
            writeln!(out, "#{} {}", entry.rank, entry.source)?;
            writeln!(out, "   Match score:    {:.1}%", entry.match_pct)?;
            writeln!(out, "   Recommendation: {}", entry.recommendation.label())?;
            writeln!(out, "   Reason:         {}", run.match_reason)?;
            writeln!(out, "   Snippet:        {}", entry.snippet.replace('\n', " "))?;
            writeln!(out)?;
        }
    }

    if let Some(report) = run.report {
        print_report_text(out, report)?;
    }
    Ok(())
}

fn print_report_text<W: Write>(out: &mut W, report: &Report) -> Result<()> {
    writeln!(out, "{RULE}")?;
    writeln!(out, "DETAILED EVALUATION")?;
    writeln!(out, "{RULE}")?;
    for (i, e) in report.evaluations.iter().enumerate() {
        match (e.status, e.score) {
            (EvaluationStatus::Completed, Some(score)) => {
                writeln!(out, "{}. {}  score {:.0}/100", i + 1, e.candidate_id, score)?;
                if let Some(rec) = &e.recommendation {
                    writeln!(out, "   Recommendation: {rec}")?;
                }
                writeln!(out, "   {}", e.rationale)?;
                write_list(out, "Strengths", &e.strengths)?;
                write_list(out, "Weaknesses", &e.weaknesses)?;
            }
            (status, _) => {
                writeln!(
                    out,
                    "{}. {}  [{}] {}",
                    i + 1,
                    e.candidate_id,
                    status_label(status),
                    e.rationale
                )?;
            }
        }
        writeln!(out)?;
    }
    if report.degraded_count() > 0 {
        writeln!(
            out,
            "{} of {} evaluation(s) unavailable",
            report.degraded_count(),
            report.evaluations.len()
        )?;
    }
    if report.cancelled {
        writeln!(out, "Evaluation was cancelled before finishing.")?;
    }
    Ok(())
}

fn write_list<W: Write>(out: &mut W, title: &str, items: &[String]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(out, "   {title}:")?;
    for item in items {
        writeln!(out, "     - {item}")?;
    }
    Ok(())
}

fn status_label(status: EvaluationStatus) -> &'static str {
    match status {
        EvaluationStatus::Completed => "completed",
        EvaluationStatus::Unparseable => "unparseable",
        EvaluationStatus::Failed => "failed",
        EvaluationStatus::Cancelled => "cancelled",
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &flat[..idx]),
        None => flat,
    }
}

#[derive(Serialize)]
struct JsonRun<'a> {
    job_description: &'a str,
    indexed: usize,
    skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    candidates: Option<Vec<JsonCandidate<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    evaluation: Option<&'a Report>,
}

#[derive(Serialize)]
struct JsonCandidate<'a> {
    rank: usize,
    id: &'a str,
    source: &'a str,
    match_pct: f32,
    recommendation: &'static str,
    reason: &'a str,
    snippet: &'a str,
}

fn print_json<W: Write>(out: &mut W, run: &RunOutput<'_>) -> Result<()> {
    let candidates = run.summary.map(|entries| {
        entries
            .iter()
            .map(|e| JsonCandidate {
                rank: e.rank,
                id: &e.candidate_id,
                source: &e.source,
                match_pct: e.match_pct,
                recommendation: e.recommendation.label(),
                reason: run.match_reason,
                snippet: &e.snippet,
            })
            .collect()
    });
    let json = JsonRun {
        job_description: run.job_description,
        indexed: run.indexed,
        skipped: run.skipped,
        candidates,
        evaluation: run.report,
    };
    let rendered = serde_json::to_string_pretty(&json)?;
    writeln!(out, "{rendered}")?;
    Ok(())
}
