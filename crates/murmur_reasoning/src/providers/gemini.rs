//! Google Gemini provider (`generateContent`).

use crate::api_types::{Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use crate::llm::{CompletionClient, CompletionParams};
use crate::retry::{with_retry, RetryConfig};
use anyhow::{Context, Result};
use murmur_core::config::AiConfig;
use reqwest::Client;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryConfig,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str, base_url: &str) -> Result<Self> {
        Ok(Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .context("Failed to build Gemini HTTP client")?,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            retry: RetryConfig::default(),
        })
    }

    pub fn from_config(config: &AiConfig, api_key: &str) -> Result<Self> {
        Self::new(api_key, &config.model, &config.base_url)
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

#[async_trait::async_trait]
impl CompletionClient for GeminiClient {
    async fn complete(&self, prompt: &str, params: CompletionParams) -> Result<String> {
        let url = self.endpoint();
        let request_body = GenerateContentRequest {
            contents: vec![Content::user_text(prompt)],
            generation_config: Some(GenerationConfig {
                max_output_tokens: params.max_output_tokens,
                temperature: params.temperature,
            }),
        };

        tracing::debug!(model = %self.model, "Sending prompt to Gemini ({} chars)", prompt.chars().count());

        let client = &self.client;
        let api_key = &self.api_key;

        let response = with_retry(&self.retry, "Gemini", || async {
            let resp = client
                .post(&url)
                .header("x-goog-api-key", api_key.as_str())
                .json(&request_body)
                .send()
                .await
                .map_err(|e| anyhow::Error::new(e.without_url()))
                .context("Failed to send request to Gemini")?;
            Ok(resp)
        })
        .await?;

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| anyhow::Error::new(e.without_url()))
            .context("Failed to parse Gemini response")?;

        if let Some(reason) = body
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            anyhow::bail!("Gemini blocked the prompt ({})", reason);
        }

        let text = body
            .first_text()
            .context("Gemini returned no candidates")?;
        let text = text.trim();
        if text.is_empty() {
            anyhow::bail!("Gemini returned an empty answer");
        }
        Ok(text.to_string())
    }

    fn provider_name(&self) -> &'static str {
        "gemini"
    }
}
