use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::gemini::{GeminiTransport, Service};
use crate::llm::{GenerationConfig, LanguageModel};

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: WireGenerationConfig,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

/// `generateContent` client. One attempt per call; retry policy belongs to
/// the caller.
pub struct GeminiClient {
    transport: GeminiTransport,
    model: String,
}

impl GeminiClient {
    pub fn new(transport: GeminiTransport, model: &str) -> Self {
        Self {
            transport,
            model: model.trim_start_matches("models/").to_string(),
        }
    }

    fn request<'a>(prompt: &'a str, config: &GenerationConfig) -> GenerateRequest<'a> {
        GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            generation_config: WireGenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
                response_mime_type: config.json_output.then_some("application/json"),
            },
        }
    }
}

fn extract_text(response: GenerateResponse) -> Result<String> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| RagError::Parse("response has no candidates".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = candidate.finish_reason.as_deref().unwrap_or("unknown");
        return Err(RagError::Parse(format!(
            "response has no text (finish reason: {reason})"
        )));
    }
    Ok(text)
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let path = format!("models/{}:generateContent", self.model);
        let body = Self::request(prompt, config);
        let response: GenerateResponse = self
            .transport
            .post_json(Service::Generation, &path, &body)
            .await?;
        extract_text(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
