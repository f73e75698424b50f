//! Process-wide components shared by every platform adapter.

use anyhow::{Context, Result};
use murmur_core::config::BotConfig;
use murmur_core::{MurmurConfig, QaTable, ReadPolicy, SpeedSetting};
use murmur_playback::{PipelineDeps, SessionConfig, SessionRegistry};
use murmur_reasoning::{CompletionClient, CompletionParams, GeminiClient, MockProvider};
use murmur_voice::{FfmpegSpeed, GoogleTts};
use std::sync::Arc;
use std::time::Duration;

pub struct Services {
    pub bot: BotConfig,
    pub registry: Arc<SessionRegistry>,
    pub speed: Arc<SpeedSetting>,
    pub qa: QaTable,
    /// `None` when no AI key is configured; the AI command then replies
    /// that it is unavailable.
    pub ai: Option<Arc<dyn CompletionClient>>,
    pub ai_params: CompletionParams,
}

impl Services {
    pub fn from_config(config: &MurmurConfig) -> Result<Self> {
        let temp_dir = config.temp_dir();
        std::fs::create_dir_all(&temp_dir).with_context(|| {
            format!("Failed to create audio directory {}", temp_dir.display())
        })?;

        let synthesizer = GoogleTts::from_config(&config.tts, temp_dir)?;
        let post_processor = FfmpegSpeed::new(&config.tts.ffmpeg_bin)
            .with_timeout(Duration::from_secs(config.tts.ffmpeg_timeout_secs));
        let speed = Arc::new(SpeedSetting::new(config.tts.default_speed)?);

        let deps = PipelineDeps {
            synthesizer: Arc::new(synthesizer),
            post_processor: Arc::new(post_processor),
            speed: Arc::clone(&speed),
        };
        let registry = SessionRegistry::new(
            deps,
            SessionConfig::from_config(config),
            Arc::new(ReadPolicy::new()),
        );

        Ok(Self {
            bot: config.bot.clone(),
            registry: Arc::new(registry),
            speed,
            qa: QaTable::from_config(&config.qa),
            ai: build_ai(config)?,
            ai_params: CompletionParams::from_config(&config.ai),
        })
    }
}

fn build_ai(config: &MurmurConfig) -> Result<Option<Arc<dyn CompletionClient>>> {
    if config.ai.provider == "mock" {
        tracing::info!("Using mock AI provider");
        return Ok(Some(Arc::new(MockProvider::new(&config.ai.model))));
    }
    match config.ai_key() {
        Some(key) => {
            let client = GeminiClient::from_config(&config.ai, key)?;
            tracing::info!(model = %client.model(), "Gemini API key loaded");
            Ok(Some(Arc::new(client)))
        }
        None => {
            tracing::warn!("GEMINI_API_KEY is not set, the AI command is disabled");
            Ok(None)
        }
    }
}
