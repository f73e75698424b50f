//! Mock completion provider: deterministic answers without an API key.

use crate::llm::{CompletionClient, CompletionParams};
use anyhow::Result;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockProvider {
    model: String,
    latency: Duration,
}

impl MockProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            latency: Duration::from_millis(200),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait::async_trait]
impl CompletionClient for MockProvider {
    async fn complete(&self, prompt: &str, _params: CompletionParams) -> Result<String> {
        tokio::time::sleep(self.latency).await;
        Ok(format!("({} mock) {}", self.model, prompt.trim()))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}
