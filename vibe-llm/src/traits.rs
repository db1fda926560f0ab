use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use vibe_common::{PostAnalysis, Result, VibeError};
use vibe_http::HttpError;

use crate::analysis::{analysis_prompt, parse_analysis};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub model: Option<String>,
    pub tokens_used: Option<u32>,
}

#[derive(thiserror::Error, Debug)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] HttpError),

    #[error("provider returned no text output")]
    EmptyResponse,

    #[error("unparseable model output: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<LlmError> for VibeError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Config(msg) => VibeError::Config(msg),
            other => VibeError::unavailable("llm", other),
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate a response to the given prompt with optional system prompt.
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse>;

    /// Check if the LLM service is available.
    async fn health_check(&self) -> Result<bool>;

    fn model_name(&self) -> &str;

    /// System prompt for community feedback analysis.
    fn default_system_prompt(&self) -> &str {
        r#"You analyze developer community posts from Reddit and Twitter about code editors and AI coding tools.

Your role:
- Judge the overall sentiment of the author toward the tools they discuss
- Identify the products mentioned and the sentiment expressed about each
- Suggest which of the provided categories the post belongs to

Guidelines:
- Base every judgement on the text itself, not on assumptions about the author
- Sarcasm and complaints framed as jokes are still negative
- Report low confidence when the post is ambiguous or off-topic
- Respond with a single JSON object and nothing else"#
    }

    /// Ask the model for sentiment, product mentions and category hints.
    ///
    /// `categories` lists the configured category names; the model is asked to
    /// choose only among them, but callers must still filter the result.
    async fn analyze_post(&self, text: &str, categories: &[String]) -> Result<PostAnalysis> {
        let prompt = analysis_prompt(text, categories);
        let response = self
            .generate(&prompt, Some(self.default_system_prompt()), Some(400), Some(0.2))
            .await?;
        tracing::debug!(
            model = self.model_name(),
            chars = response.text.len(),
            "llm.analyze_post.response"
        );

        let model = response
            .model
            .clone()
            .unwrap_or_else(|| self.model_name().to_string());
        let analysis = parse_analysis(&response.text, Some(model))?;
        Ok(analysis)
    }
}
