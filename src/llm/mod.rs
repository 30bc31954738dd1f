use async_trait::async_trait;

use crate::error::Result;

pub mod gemini;
pub mod mock;

pub use gemini::GeminiClient;
pub use mock::ScriptedModel;

pub const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1024;

/// Per-call sampling parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the provider to constrain output to a JSON document.
    pub json_output: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            json_output: false,
        }
    }
}

impl GenerationConfig {
    pub fn json(mut self) -> Self {
        self.json_output = true;
        self
    }
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String>;

    fn model_name(&self) -> &str;
}
