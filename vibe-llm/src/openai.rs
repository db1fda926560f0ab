use crate::traits::{LlmClient, LlmError, LlmResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vibe_common::Result;
use vibe_http::{Auth, HttpClient, RequestOpts};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1/";

/// Client for the OpenAI Responses API.
pub struct OpenAiClient {
    client: HttpClient,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ResponsesApiRequest<'a> {
    model: &'a str,
    input: &'a str,
    instructions: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponsesApiResponse {
    model: String,
    #[serde(default)]
    output: Vec<ResponseMessage>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Vec<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Result<Self> {
        Self::with_endpoint(api_key, model, OPENAI_API_BASE)
    }

    /// Point the client at an OpenAI-compatible gateway (or a mock server).
    pub fn with_endpoint(api_key: String, model: String, endpoint: &str) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(LlmError::Config("OpenAI api key is empty".into()).into());
        }
        // `Url::join` drops the last segment unless the base ends with '/'.
        let base = if endpoint.ends_with('/') {
            endpoint.to_string()
        } else {
            format!("{endpoint}/")
        };
        let client = HttpClient::new(&base)
            .map_err(|e| LlmError::Config(format!("http client init failed: {e}")))?
            .with_timeout(Duration::from_secs(60));

        Ok(Self {
            client,
            api_key,
            model,
            temperature: None,
            max_tokens: None,
        })
    }

    /// Defaults applied when a call does not pass its own values.
    pub fn with_generation(mut self, temperature: Option<f32>, max_tokens: Option<u32>) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.client = self.client.with_retries(retries);
        self
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> Result<LlmResponse> {
        let req = ResponsesApiRequest {
            model: &self.model,
            input: prompt,
            instructions: system_prompt.unwrap_or("You are a careful, objective analyst."),
            temperature: temperature.or(self.temperature),
            max_output_tokens: max_tokens.or(self.max_tokens),
        };
        tracing::debug!(model=%self.model, prompt_chars = prompt.len(), "llm.openai.generate");

        let opts = RequestOpts {
            auth: Some(Auth::Bearer(&self.api_key)),
            ..Default::default()
        };
        let resp: ResponsesApiResponse = self
            .client
            .post_json_opts("responses", &req, opts)
            .await
            .map_err(LlmError::from)?;

        let text = resp
            .output
            .iter()
            .flat_map(|msg| &msg.content)
            .filter(|c| c.kind == "output_text")
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            return Err(LlmError::EmptyResponse.into());
        }

        Ok(LlmResponse {
            text,
            model: Some(resp.model),
            tokens_used: resp.usage.and_then(|u| u.total_tokens),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<bool> {
        let probe = self.generate("Respond with just 'OK'", None, Some(16), Some(0.0));
        match tokio::time::timeout(Duration::from_secs(10), probe).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => {
                tracing::warn!(error=%e, "llm.openai.health_check.failed");
                Ok(false)
            }
            Err(_) => {
                tracing::warn!("llm.openai.health_check.timeout");
                Ok(false)
            }
        }
    }
}
