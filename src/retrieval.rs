use std::sync::Arc;

use crate::embed::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::index::IndexHandle;
use crate::model::ScoredCandidate;

pub const DEFAULT_TOP_K: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Cosine of the angle between `a` and `b`. Zero for mismatched lengths or
/// when either side is the zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let denom = dot(a, a).sqrt() * dot(b, b).sqrt();
    if denom == 0.0 { 0.0 } else { dot(a, b) / denom }
}

/// Embeds a query and looks up its nearest candidates in the live index.
#[derive(Clone)]
pub struct Retriever {
    index: IndexHandle,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(index: IndexHandle, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { index, embedder }
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub async fn retrieve(&self, query_text: &str, top_k: usize) -> Result<Vec<ScoredCandidate>> {
        if top_k == 0 {
            return Err(RagError::InvalidArgument(
                "top_k must be a positive integer".to_string(),
            ));
        }

        let index = self.index.snapshot();
        if index.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        let query_embedding = self.embedder.embed(query_text).await?;
        let hits = index.query(&query_embedding, top_k)?;
        tracing::debug!(
            "Retrieved {} of {} candidate(s) for top_k={top_k}",
            hits.len(),
            index.len()
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashEmbeddingProvider;
    use crate::index::VectorIndex;
    use crate::model::mk_record;
    use async_trait::async_trait;

    /// Always embeds to the same query vector, so similarities are fixed by
    /// the stored vectors.
    struct FixedQuery(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedQuery {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(self.0.clone())
        }
        fn dimensions(&self) -> usize {
            self.0.len()
        }
        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    struct Broken;

    #[async_trait]
    impl EmbeddingProvider for Broken {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::Embedding("provider down".to_string()))
        }
        fn dimensions(&self) -> usize {
            2
        }
        fn model_name(&self) -> &str {
            "broken"
        }
    }

    /// Unit vectors whose cosine with (1, 0) is exactly the given similarity.
    fn at_similarity(s: f32) -> Vec<f32> {
        vec![s, (1.0 - s * s).sqrt()]
    }

    fn three_record_retriever() -> Retriever {
        let mut index = VectorIndex::empty(2, "fixed");
        index.insert(mk_record("mid", "m"), at_similarity(0.7)).expect("insert");
        index.insert(mk_record("low", "l"), at_similarity(0.5)).expect("insert");
        index.insert(mk_record("high", "h"), at_similarity(0.9)).expect("insert");
        Retriever::new(IndexHandle::new(index), Arc::new(FixedQuery(vec![1.0, 0.0])))
    }

    #[tokio::test]
    async fn returns_top_k_sorted_descending() {
        let retriever = three_record_retriever();
        let hits = retriever.retrieve("accountant", 2).await.expect("retrieve");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id(), "high");
        assert_eq!(hits[1].id(), "mid");
        assert!((hits[0].similarity - 0.9).abs() < 1e-5);
        assert!((hits[1].similarity - 0.7).abs() < 1e-5);
    }

    #[tokio::test]
    async fn length_never_exceeds_top_k_or_corpus() {
        let retriever = three_record_retriever();
        for k in 1..=5 {
            let hits = retriever.retrieve("q", k).await.expect("retrieve");
            assert_eq!(hits.len(), k.min(3));
            assert!(hits.windows(2).all(|w| w[0].similarity > w[1].similarity));
        }
    }

    #[tokio::test]
    async fn zero_top_k_is_invalid() {
        let err = three_record_retriever().retrieve("q", 0).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn empty_index_fails_for_any_top_k() {
        let embedder = Arc::new(HashEmbeddingProvider::new(16));
        let retriever = Retriever::new(IndexHandle::new(VectorIndex::empty(16, "hash-16")), embedder);
        for k in [1, 3, 100] {
            let err = retriever.retrieve("q", k).await.unwrap_err();
            assert!(matches!(err, RagError::EmptyIndex));
        }
    }

    #[tokio::test]
    async fn embedding_failures_propagate() {
        let mut index = VectorIndex::empty(2, "broken");
        index.insert(mk_record("a", "a"), vec![1.0, 0.0]).expect("insert");
        let retriever = Retriever::new(IndexHandle::new(index), Arc::new(Broken));
        let err = retriever.retrieve("q", 1).await.unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn sees_swapped_index() {
        let retriever = three_record_retriever();
        let mut replacement = VectorIndex::empty(2, "fixed");
        replacement
            .insert(mk_record("fresh", "f"), at_similarity(0.3))
            .expect("insert");
        retriever.index().swap(replacement);
        let hits = retriever.retrieve("q", 3).await.expect("retrieve");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), "fresh");
    }

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn cosine_measures_direction_only() {
        let x = [1.0, 0.0, 0.0];
        let y = [0.0, 1.0, 0.0];
        assert!(close(cosine_similarity(&x, &x), 1.0));
        assert!(close(cosine_similarity(&x, &y), 0.0));
        assert!(close(cosine_similarity(&x, &[-2.0, 0.0, 0.0]), -1.0));
        assert!(close(cosine_similarity(&[3.0, 4.0], &[30.0, 40.0]), 1.0));
        assert!(close(
            cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]),
            std::f32::consts::FRAC_1_SQRT_2
        ));
    }

    #[test]
    fn cosine_is_zero_for_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[1.0, 0.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.5, 0.5], &[0.0, 0.0]), 0.0);
    }
}
