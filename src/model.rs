use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const META_FILE_NAME: &str = "file_name";
pub const META_SOURCE_PATH: &str = "source_path";
pub const META_CHAR_COUNT: &str = "char_count";

/// One ingested resume. Immutable after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub ingested_at: DateTime<Utc>,
}

impl CandidateRecord {
    pub fn file_name(&self) -> &str {
        self.metadata
            .get(META_FILE_NAME)
            .map(String::as_str)
            .unwrap_or("Unknown")
    }

    /// First `max_chars` characters of the text, on a char boundary.
    pub fn snippet(&self, max_chars: usize) -> &str {
        match self.text.char_indices().nth(max_chars) {
            Some((idx, _)) => &self.text[..idx],
            None => &self.text,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub record: Arc<CandidateRecord>,
    pub similarity: f32,
    /// The value the list is ordered by; equals `similarity` until reranked.
    pub score: f32,
    /// 1-based position in the list that produced this candidate.
    pub rank: usize,
}

impl ScoredCandidate {
    pub fn id(&self) -> &str {
        &self.record.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Completed,
    Unparseable,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub candidate_id: String,
    pub status: EvaluationStatus,
    pub score: Option<f32>,
    pub rationale: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub recommendation: Option<String>,
}

pub const EVALUATION_UNAVAILABLE: &str = "evaluation unavailable";
pub const EVALUATION_CANCELLED: &str = "evaluation cancelled";

impl Evaluation {
    pub fn degraded(candidate_id: impl Into<String>, status: EvaluationStatus) -> Self {
        let rationale = match status {
            EvaluationStatus::Cancelled => EVALUATION_CANCELLED,
            _ => EVALUATION_UNAVAILABLE,
        };
        Self {
            candidate_id: candidate_id.into(),
            status,
            score: None,
            rationale: rationale.to_string(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            recommendation: None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.status != EvaluationStatus::Completed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub job_description: String,
    pub evaluations: Vec<Evaluation>,
    pub cancelled: bool,
}

impl Report {
    pub fn degraded_count(&self) -> usize {
        self.evaluations.iter().filter(|e| e.is_degraded()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
pub(crate) fn mk_record(id: &str, text: &str) -> CandidateRecord {
    let mut metadata = BTreeMap::new();
    metadata.insert(META_FILE_NAME.to_string(), id.to_string());
    CandidateRecord {
        id: id.to_string(),
        text: text.to_string(),
        metadata,
        ingested_at: Utc::now(),
    }
}
