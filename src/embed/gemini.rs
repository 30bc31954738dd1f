use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::embed::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::gemini::{GeminiTransport, Service};
use crate::retry::RetryPolicy;

pub const DEFAULT_EMBEDDING_MODEL: &str = "models/embedding-001";
pub const DEFAULT_GEMINI_EMBEDDING_DIM: usize = 768;
/// Upper bound the API accepts for one `batchEmbedContents` call.
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

/// Embeddings from the Gemini `embedContent` endpoints. Transient transport
/// failures are retried here; callers see only the final outcome.
pub struct GeminiEmbeddingProvider {
    transport: GeminiTransport,
    model: String,
    dims: usize,
    retry: RetryPolicy,
}

impl GeminiEmbeddingProvider {
    pub fn new(transport: GeminiTransport, model: &str, dims: usize, retry: RetryPolicy) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        Self {
            transport,
            model,
            dims,
            retry,
        }
    }

    fn request<'a>(&'a self, text: &'a str) -> EmbedRequest<'a> {
        EmbedRequest {
            model: &self.model,
            content: Content {
                parts: [Part { text }],
            },
        }
    }

    fn check_dims(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: values.len(),
            });
        }
        Ok(())
    }
}

fn batches(texts: &[String], max: usize) -> std::slice::Chunks<'_, String> {
    texts.chunks(max.max(1))
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let path = format!("{}:embedContent", self.model);
        let body = self.request(text);
        let response: EmbedResponse = self
            .retry
            .run(&CancellationToken::new(), "embedContent", || {
                self.transport.post_json(Service::Embedding, &path, &body)
            })
            .await?;
        self.check_dims(&response.embedding.values)?;
        Ok(response.embedding.values)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let path = format!("{}:batchEmbedContents", self.model);
        let mut out = Vec::with_capacity(texts.len());
        for chunk in batches(texts, MAX_BATCH_SIZE) {
            let body = BatchEmbedRequest {
                requests: chunk.iter().map(|t| self.request(t)).collect(),
            };
            let response: BatchEmbedResponse = self
                .retry
                .run(&CancellationToken::new(), "batchEmbedContents", || {
                    self.transport.post_json(Service::Embedding, &path, &body)
                })
                .await?;
            if response.embeddings.len() != chunk.len() {
                return Err(RagError::Parse(format!(
                    "batchEmbedContents returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    chunk.len()
                )));
            }
            for e in response.embeddings {
                self.check_dims(&e.values)?;
                out.push(e.values);
            }
            tracing::debug!("Embedded {}/{} texts", out.len(), texts.len());
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
