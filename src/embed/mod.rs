use async_trait::async_trait;

use crate::error::Result;

pub mod gemini;
pub mod hash;

pub use gemini::GeminiEmbeddingProvider;
pub use hash::HashEmbeddingProvider;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;

    /// Recorded in persisted indexes so vectors from different models never mix.
    fn model_name(&self) -> &str;
}

#[async_trait]
impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts).await
    }

    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}
