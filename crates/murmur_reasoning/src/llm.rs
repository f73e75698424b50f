use anyhow::Result;
use async_trait::async_trait;
use murmur_core::config::AiConfig;

/// Generation knobs passed with every completion request.
#[derive(Debug, Clone)]
pub struct CompletionParams {
    /// Upper bound on generated tokens.
    pub max_output_tokens: u32,
    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,
}

impl Default for CompletionParams {
    fn default() -> Self {
        Self {
            max_output_tokens: 1024,
            temperature: 0.7,
        }
    }
}

impl CompletionParams {
    pub fn from_config(config: &AiConfig) -> Self {
        Self {
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature.clamp(0.0, 2.0),
        }
    }
}

/// A service that answers a free-form question with text.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Answer `prompt`. The returned text is what gets replied and spoken.
    async fn complete(&self, prompt: &str, params: CompletionParams) -> Result<String>;

    fn provider_name(&self) -> &'static str;
}
