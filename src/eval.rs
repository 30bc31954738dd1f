use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::{RagError, Result};
use crate::llm::{GenerationConfig, LanguageModel};
use crate::model::{Evaluation, EvaluationStatus, Report, ScoredCandidate};
use crate::retry::RetryPolicy;

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_RESUME_CHARS: usize = 12_000;
pub const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    pub max_concurrency: usize,
    pub retry: RetryPolicy,
    pub generation: GenerationConfig,
    /// Resume text beyond this many characters is cut from the prompt.
    pub max_resume_chars: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry: RetryPolicy::default(),
            generation: GenerationConfig::default(),
            max_resume_chars: DEFAULT_MAX_RESUME_CHARS,
        }
    }
}

/// Asks the LLM for a structured verdict on each candidate.
///
/// Calls run concurrently up to `max_concurrency`, but the report keeps the
/// input order. A candidate whose response cannot be parsed, or whose calls
/// keep failing after the retry budget, gets a degraded entry instead of
/// failing the batch. Credential and request errors abort the batch.
pub struct Evaluator {
    llm: Arc<dyn LanguageModel>,
    config: EvaluatorConfig,
}

impl Evaluator {
    pub fn new(llm: Arc<dyn LanguageModel>, config: EvaluatorConfig) -> Self {
        Self { llm, config }
    }

    pub async fn evaluate(
        &self,
        candidates: &[ScoredCandidate],
        job_description: &str,
        cancel: &CancellationToken,
    ) -> Result<Report> {
        if job_description.trim().is_empty() {
            return Err(RagError::InvalidArgument(
                "job description must not be empty".to_string(),
            ));
        }

        let batch = cancel.child_token();
        let limit = self.config.max_concurrency.max(1);
        tracing::info!(
            "Evaluating {} candidate(s) with {} (concurrency {limit})",
            candidates.len(),
            self.llm.model_name()
        );

        let results: Vec<Result<Evaluation>> = stream::iter(candidates)
            .map(|candidate| self.evaluate_one(candidate, job_description, &batch))
            .buffered(limit)
            .collect()
            .await;

        let mut evaluations = Vec::with_capacity(results.len());
        for result in results {
            evaluations.push(result?);
        }

        let cancelled = cancel.is_cancelled()
            || evaluations
                .iter()
                .any(|e| e.status == EvaluationStatus::Cancelled);
        let report = Report {
            job_description: job_description.to_string(),
            evaluations,
            cancelled,
        };
        tracing::info!(
            "Evaluation finished: {} entries, {} degraded{}",
            report.evaluations.len(),
            report.degraded_count(),
            if cancelled { " (cancelled)" } else { "" }
        );
        Ok(report)
    }

    async fn evaluate_one(
        &self,
        candidate: &ScoredCandidate,
        job_description: &str,
        batch: &CancellationToken,
    ) -> Result<Evaluation> {
        let id = candidate.id();
        if batch.is_cancelled() {
            return Ok(Evaluation::degraded(id, EvaluationStatus::Cancelled));
        }

        let prompt = evaluation_prompt(candidate, job_description, self.config.max_resume_chars);
        let generation = self.config.generation.clone().json();
        let what = format!("evaluation of {id}");
        let outcome = self
            .config
            .retry
            .run(batch, &what, || self.llm.generate(&prompt, &generation))
            .await
            .and_then(|text| parse_evaluation(id, &text));

        match outcome {
            Ok(evaluation) => {
                tracing::debug!("Evaluated {id}: score {:?}", evaluation.score);
                Ok(evaluation)
            }
            Err(RagError::Cancelled) => Ok(Evaluation::degraded(id, EvaluationStatus::Cancelled)),
            Err(err) if batch.is_cancelled() && !err.is_fatal() => {
                tracing::debug!("Evaluation of {id} interrupted: {err}");
                Ok(Evaluation::degraded(id, EvaluationStatus::Cancelled))
            }
            Err(RagError::Parse(reason)) => {
                tracing::warn!("Unparseable evaluation for {id}: {reason}");
                Ok(Evaluation::degraded(id, EvaluationStatus::Unparseable))
            }
            Err(err) if err.is_fatal() => {
                batch.cancel();
                Err(err)
            }
            Err(err) => {
                tracing::warn!("Evaluation of {id} failed: {err}");
                Ok(Evaluation::degraded(id, EvaluationStatus::Failed))
            }
        }
    }
}

pub fn evaluation_prompt(
    candidate: &ScoredCandidate,
    job_description: &str,
    max_resume_chars: usize,
) -> String {
    let resume = candidate.record.snippet(max_resume_chars);
    format!(
        "You are screening candidates for the job described below.\n\
         \n\
         Job Description:\n\
         {jd}\n\
         \n\
         Candidate resume (source: {source}):\n\
         {resume}\n\
         \n\
         Evaluate how well this candidate fits the job. Respond with a single JSON object:\n\
         {{\"score\": <overall match from 0 to 100>, \
         \"rationale\": \"<two or three sentences>\", \
         \"strengths\": [\"<3-5 key strengths>\"], \
         \"weaknesses\": [\"<2-3 potential gaps>\"], \
         \"recommendation\": \"Highly Recommended | Recommended | Not Recommended\"}}\n\
         Be specific and cite actual experience and skills from the resume.",
        jd = job_description.trim(),
        source = candidate.record.file_name(),
    )
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    score: Option<Value>,
    #[serde(alias = "summary")]
    rationale: Option<String>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default, alias = "gaps", alias = "concerns")]
    weaknesses: Vec<String>,
    recommendation: Option<String>,
}

/// Parse a model response into an evaluation. Tolerates Markdown fences and
/// prose around the JSON object.
pub fn parse_evaluation(candidate_id: &str, response: &str) -> Result<Evaluation> {
    let start = response.find('{');
    let end = response.rfind('}');
    let body = match (start, end) {
        (Some(s), Some(e)) if s < e => &response[s..=e],
        _ => return Err(RagError::Parse("no JSON object in response".to_string())),
    };

    let raw: RawEvaluation = serde_json::from_str(body)
        .map_err(|e| RagError::Parse(format!("evaluation JSON: {e}")))?;

    let score = raw
        .score
        .as_ref()
        .and_then(score_value)
        .ok_or_else(|| RagError::Parse("missing or non-numeric score".to_string()))?;
    if !(0.0..=100.0).contains(&score) {
        return Err(RagError::Parse(format!("score {score} outside 0-100")));
    }
    let rationale = raw
        .rationale
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .ok_or_else(|| RagError::Parse("missing rationale".to_string()))?;

    let clean = |items: Vec<String>| -> Vec<String> {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    Ok(Evaluation {
        candidate_id: candidate_id.to_string(),
        status: EvaluationStatus::Completed,
        score: Some(score),
        rationale,
        strengths: clean(raw.strengths),
        weaknesses: clean(raw.weaknesses),
        recommendation: raw
            .recommendation
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty()),
    })
}

fn score_value(value: &Value) -> Option<f32> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n as f32)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    HighlyRecommended,
    Recommended,
    Consider,
}

impl Recommendation {
    pub fn from_match_pct(pct: f32) -> Self {
        if pct > 80.0 {
            Recommendation::HighlyRecommended
        } else if pct > 60.0 {
            Recommendation::Recommended
        } else {
            Recommendation::Consider
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Recommendation::HighlyRecommended => "HIGHLY RECOMMENDED",
            Recommendation::Recommended => "RECOMMENDED",
            Recommendation::Consider => "CONSIDER",
        }
    }
}

/// One line of the similarity-based summary report.
#[derive(Debug, Clone, Serialize)]
pub struct SummaryEntry {
    pub rank: usize,
    pub candidate_id: String,
    pub source: String,
    pub match_pct: f32,
    pub recommendation: Recommendation,
    pub snippet: String,
}

pub fn summarize(candidates: &[ScoredCandidate]) -> Vec<SummaryEntry> {
    candidates
        .iter()
        .map(|c| {
            // Keyword boosts can push the score past 1.0.
            let match_pct = (c.score * 100.0).clamp(0.0, 100.0);
            SummaryEntry {
                rank: c.rank,
                candidate_id: c.id().to_string(),
                source: c.record.file_name().to_string(),
                match_pct,
                recommendation: Recommendation::from_match_pct(match_pct),
                snippet: c.record.snippet(SNIPPET_CHARS).to_string(),
            }
        })
        .collect()
}
