//! Shared HTTP plumbing for Google's Generative Language API.
//!
//! Both the embedding provider and the LLM client talk to the same endpoint
//! with the same key; only the error variant they surface differs.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{RagError, Result};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const API_KEY_ENV_VAR: &str = "GEMINI_API_KEY";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Embedding,
    Generation,
}

impl Service {
    fn error(self, message: String) -> RagError {
        match self {
            Service::Embedding => RagError::Embedding(message),
            Service::Generation => RagError::Generation(message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiTransport {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(RagError::Config(format!(
                "Gemini API key is empty. Set {API_KEY_ENV_VAR} or llm.api_key"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RagError::Config(format!("build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.endpoint, path.trim_start_matches('/'))
    }

    pub async fn post_json<Req, Resp>(&self, service: Service, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = self.url(path);
        tracing::debug!("POST {url}");
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| service.error(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(service, status, &body));
        }

        let text = response
            .text()
            .await
            .map_err(|e| service.error(format!("read response body: {e}")))?;
        serde_json::from_str(&text)
            .map_err(|e| RagError::Parse(format!("unexpected response shape from {path}: {e}")))
    }
}

fn classify_status(service: Service, status: StatusCode, body: &str) -> RagError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.trim());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RagError::Unauthorized(message),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => {
            RagError::InvalidArgument(format!("request rejected: {message}"))
        }
        _ => service.error(message),
    }
}
