use std::collections::HashSet;

use crate::error::{RagError, Result};
use crate::model::ScoredCandidate;

pub const DEFAULT_TOP_N: usize = 3;
pub const DEFAULT_BOOST_WEIGHT: f32 = 0.2;

#[derive(Debug, Clone, PartialEq)]
pub enum RerankPolicy {
    /// Keep the retrieval order and truncate.
    Similarity,
    /// `similarity + boost_weight * (matched keywords / keywords)`.
    KeywordBoosted {
        keywords: Vec<String>,
        boost_weight: f32,
    },
}

impl RerankPolicy {
    pub fn keyword_boosted<I, S>(keywords: I, boost_weight: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RerankPolicy::KeywordBoosted {
            keywords: keywords.into_iter().map(Into::into).collect(),
            boost_weight,
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            RerankPolicy::Similarity => "High semantic similarity to job requirements",
            RerankPolicy::KeywordBoosted { .. } => {
                "High semantic similarity with keyword relevance"
            }
        }
    }
}

/// Reorders an already retrieved candidate set. Never queries the index and
/// never adds candidates.
#[derive(Debug, Clone)]
pub struct Reranker {
    policy: RerankPolicy,
}

impl Reranker {
    pub fn new(policy: RerankPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RerankPolicy {
        &self.policy
    }

    pub fn rerank(&self, candidates: &[ScoredCandidate], top_n: usize) -> Result<Vec<ScoredCandidate>> {
        if top_n == 0 {
            return Err(RagError::InvalidArgument(
                "top_n must be at least 1".to_string(),
            ));
        }

        let mut out = match &self.policy {
            RerankPolicy::Similarity => simple_rerank(candidates, top_n),
            RerankPolicy::KeywordBoosted {
                keywords,
                boost_weight,
            } => keyword_rerank(candidates, keywords, *boost_weight, top_n)?,
        };

        for (i, c) in out.iter_mut().enumerate() {
            c.rank = i + 1;
        }
        tracing::debug!(
            "Reranked {} candidate(s) down to {}",
            candidates.len(),
            out.len()
        );
        Ok(out)
    }
}

fn simple_rerank(candidates: &[ScoredCandidate], top_n: usize) -> Vec<ScoredCandidate> {
    candidates.iter().take(top_n).cloned().collect()
}

fn keyword_rerank(
    candidates: &[ScoredCandidate],
    keywords: &[String],
    boost_weight: f32,
    top_n: usize,
) -> Result<Vec<ScoredCandidate>> {
    if !boost_weight.is_finite() || boost_weight < 0.0 {
        return Err(RagError::InvalidArgument(format!(
            "boost_weight must be a non-negative number, got {boost_weight}"
        )));
    }
    let phrases: Vec<Vec<String>> = keywords
        .iter()
        .map(|k| tokenize(k))
        .filter(|t| !t.is_empty())
        .collect();
    if phrases.is_empty() {
        return Err(RagError::InvalidArgument(
            "keyword-boosted reranking needs at least one keyword".to_string(),
        ));
    }

    let mut boosted: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|c| {
            let ratio = keyword_match_ratio(&c.record.text, &phrases);
            let mut c = c.clone();
            c.score = c.similarity + boost_weight * ratio;
            c
        })
        .collect();

    boosted.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.similarity.total_cmp(&a.similarity))
            .then_with(|| a.id().cmp(b.id()))
    });
    boosted.truncate(top_n);
    Ok(boosted)
}

/// Lowercase alphanumeric words.
/// Lowercase alphanumeric words. Shared with the hash embedder so keyword
/// matching and embedding see the same vocabulary.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Fraction of keyword phrases occurring as whole-word sequences in `text`.
fn keyword_match_ratio(text: &str, phrases: &[Vec<String>]) -> f32 {
    if phrases.is_empty() {
        return 0.0;
    }
    let words = tokenize(text);
    let vocabulary: HashSet<&str> = words.iter().map(String::as_str).collect();

    let matched = phrases
        .iter()
        .filter(|phrase| match phrase.as_slice() {
            [single] => vocabulary.contains(single.as_str()),
            multi => words.windows(multi.len()).any(|w| w == multi),
        })
        .count();
    matched as f32 / phrases.len() as f32
}
