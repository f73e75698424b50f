use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::speed::{validate_speed, DEFAULT_SPEED};

// ============================================================================
// Top-level config
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    pub bot: BotConfig,
    pub tts: TtsConfig,
    pub playback: PlaybackConfig,
    pub ai: AiConfig,
    pub qa: QaConfig,
    /// Never read from the file, only from the environment.
    #[serde(skip)]
    pub secrets: Secrets,
}

impl MurmurConfig {
    /// Load config from a TOML file, falling back to defaults for missing fields.
    /// After loading, env var overrides are applied.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let mut config: MurmurConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML config")?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Try to load from path; if file doesn't exist, return defaults with env overrides.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::info!("Config file not found or invalid ({}), using defaults", e);
                let mut cfg = Self::default();
                cfg.apply_env_overrides();
                if let Err(e) = cfg.validate() {
                    tracing::warn!("Ignoring invalid env override: {}", e);
                    cfg.tts.default_speed = DEFAULT_SPEED;
                }
                cfg
            }
        }
    }

    /// Apply environment variable overrides on top of file-based config.
    fn apply_env_overrides(&mut self) {
        self.secrets = Secrets::from_env();

        if let Ok(v) = std::env::var("MURMUR_PREFIX") {
            self.bot.command_prefix = v;
        }
        if let Ok(v) = std::env::var("MURMUR_LANGUAGE") {
            self.tts.language = v;
        }
        if let Ok(v) = std::env::var("MURMUR_SPEED") {
            if let Ok(n) = v.parse() {
                self.tts.default_speed = n;
            }
        }
        if let Ok(v) = std::env::var("MURMUR_TEMP_DIR") {
            self.tts.temp_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("FFMPEG_BIN") {
            self.tts.ffmpeg_bin = v;
        }
        if let Ok(v) = std::env::var("MURMUR_PLAYER") {
            self.playback.local_player = Some(v);
        }
        if let Ok(v) = std::env::var("MURMUR_AI_PROVIDER") {
            self.ai.provider = v;
        }
        if let Ok(v) = std::env::var("GEMINI_MODEL") {
            self.ai.model = v;
        }
        if let Ok(v) = std::env::var("GEMINI_BASE_URL") {
            self.ai.base_url = v;
        }
    }

    fn validate(&self) -> Result<()> {
        validate_speed(self.tts.default_speed).context("Invalid tts.default_speed")?;
        if self.bot.command_prefix.is_empty() {
            anyhow::bail!("bot.command_prefix must not be empty");
        }
        if self.playback.poll_interval_ms == 0 {
            anyhow::bail!("playback.poll_interval_ms must be positive");
        }
        if !matches!(self.ai.provider.as_str(), "gemini" | "mock") {
            anyhow::bail!("Unknown ai.provider '{}' (expected gemini or mock)", self.ai.provider);
        }
        Ok(())
    }

    /// The chat platform token. Its absence is fatal at startup.
    pub fn require_platform_token(&self) -> Result<&str> {
        self.secrets
            .discord_token
            .as_deref()
            .context("DISCORD_BOT_TOKEN is not set")
    }

    /// The AI service key. Its absence only disables the AI command.
    pub fn ai_key(&self) -> Option<&str> {
        self.secrets.gemini_api_key.as_deref()
    }

    /// Directory for temporary audio files.
    pub fn temp_dir(&self) -> PathBuf {
        self.tts
            .temp_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

// ============================================================================
// Sub-configs
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub command_prefix: String,
    /// Role required for the read-mode commands.
    pub owner_role: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            command_prefix: "!".to_string(),
            owner_role: "เจ้าของดิส".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Language tag passed to the synthesizer.
    pub language: String,
    pub default_speed: f32,
    /// Override for the synthesis endpoint (tests, proxies).
    pub base_url: String,
    pub temp_dir: Option<PathBuf>,
    pub ffmpeg_bin: String,
    /// Per-request limit for synthesis calls. Unset means no limit; a hung
    /// call then holds its item until the session is cancelled.
    pub request_timeout_secs: Option<u64>,
    pub ffmpeg_timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            language: "th".to_string(),
            default_speed: DEFAULT_SPEED,
            base_url: "https://translate.google.com".to_string(),
            temp_dir: None,
            ffmpeg_bin: "ffmpeg".to_string(),
            request_timeout_secs: None,
            ffmpeg_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// How often a worker re-checks whether the voice connection is still busy.
    pub poll_interval_ms: u64,
    /// How long teardown waits for a cancelled worker before aborting it.
    pub shutdown_grace_ms: u64,
    /// Player binary for the console platform. Searched on PATH when unset.
    pub local_player: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            shutdown_grace_ms: 2000,
            local_player: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// `gemini`, or `mock` for keyless development.
    pub provider: String,
    pub model: String,
    pub base_url: String,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-1.5-flash-latest".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            max_output_tokens: 1024,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Reply when a question has no scripted answer.
    pub fallback: String,
    pub entries: BTreeMap<String, String>,
}

const BUILTIN_QA: &[(&str, &str)] = &[
    ("สวัสดี", "สวัสดีครับ มีอะไรให้ผมรับใช้ครับ"),
    ("เจ็บไหม", "เจ็บไหม? : มาย ไม่เจ็บหรอก... แค่ชินกับการไม่ได้เป็นคนสำคัญ"),
    ("ใครกลัวยาย", "ใครกล้ายาย : กอก้า กล้า กลัวยายไง"),
    ("เป็นอะไร", "เป็นอะไร ทำไมไม่เหมือนเดิม? : เขา เปลี่ยนไปนานแล้ว แต่ไม่มีใครสังเกต"),
    (
        "ใครไม่ชอบออกตัดเลือด",
        "ใครไม่ชอบออกตัดเลือด : โอ้ คำถามนี้ ถือว่าถามได้ดีเลย จากการประมวลผลใน Server Family Game 24 Hrs. แล้ว สรุปได้ว่า คนที่ไม่ชอบออกตัดเลือดคือ ตระกูล ม.ม้า นะคะ",
    ),
    ("ใครผัวเยอะที่สุด", "ใครผัวเยอะที่สุด : โมเดลเมจขาตายไม่ออกตัดเลือด"),
    ("ใครขี้เมาที่สุด", "ใครขี้เมาที่สุด : เมษาเมจไงคะ ขี้เมาที่สุดแล้ว"),
    ("จนมาเห็นกับตา", "จนมาเห็นกับตาจนพาใจมาเจ็บ  ฉีกบ่มีหม่องเย็บ หัวใจที่ให้เจ้า"),
    ("มายรอเขาอยู่เหรอ", "มาย รอมาตลอด แต่เขาไม่เคยหันกลับมาเลย"),
    ("ใครจกที่สุด", "ใครจกที่สุด : ไก่มายไงคะ จกที่สุดแล้ว"),
    ("เจ้ตามเป็นอะไร", "เจ้ตามเป็นอะไร : เจ้ตามเป็นของทุกคนเลยนะจ๊ะ"),
    ("ใครหล่อที่สุด", "ใครหล่อที่สุด : พี่คิวสุดหล่อเจ้าของดิสไงคะ"),
];

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            fallback: "ขออภัยครับ ผมยังไม่เข้าใจคำถามของคุณ".to_string(),
            entries: BUILTIN_QA
                .iter()
                .map(|(q, a)| (q.to_string(), a.to_string()))
                .collect(),
        }
    }
}

#[derive(Clone, Default)]
pub struct Secrets {
    pub discord_token: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            discord_token: non_empty_env("DISCORD_BOT_TOKEN"),
            gemini_api_key: non_empty_env("GEMINI_API_KEY"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("discord_token", &self.discord_token.as_ref().map(|_| "<redacted>"))
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = MurmurConfig::default();
        assert_eq!(cfg.bot.command_prefix, "!");
        assert_eq!(cfg.tts.language, "th");
        assert_eq!(cfg.tts.default_speed, 1.2);
        assert_eq!(cfg.playback.poll_interval_ms, 500);
        assert_eq!(cfg.ai.model, "gemini-1.5-flash-latest");
        assert_eq!(cfg.tts.request_timeout_secs, None);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_default_qa_has_builtin_answers() {
        let qa = QaConfig::default();
        assert_eq!(qa.entries.len(), 12);
        assert_eq!(qa.entries["สวัสดี"], "สวัสดีครับ มีอะไรให้ผมรับใช้ครับ");
        assert!(qa.entries["เจ็บไหม"].starts_with("เจ็บไหม? : มาย"));
        assert!(qa.entries["ใครหล่อที่สุด"].contains("พี่คิว"));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
[tts]
language = "en"
"#;
        let cfg: MurmurConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.tts.language, "en");
        // Defaults for unspecified fields
        assert_eq!(cfg.tts.default_speed, 1.2);
        assert_eq!(cfg.bot.owner_role, "เจ้าของดิส");
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
[bot]
command_prefix = "?"
owner_role = "admin"

[tts]
language = "ja"
default_speed = 1.5
base_url = "http://localhost:9000"
temp_dir = "/tmp/murmur"
ffmpeg_bin = "/usr/local/bin/ffmpeg"
request_timeout_secs = 5

[playback]
poll_interval_ms = 250
shutdown_grace_ms = 100
local_player = "mpg123"

[ai]
provider = "mock"
model = "gemini-2.0-flash"
max_output_tokens = 256
temperature = 0.2

[qa]
fallback = "dunno"

[qa.entries]
"who are you" = "a parrot"
"#;
        let cfg: MurmurConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.bot.command_prefix, "?");
        assert_eq!(cfg.tts.default_speed, 1.5);
        assert_eq!(cfg.tts.temp_dir, Some(PathBuf::from("/tmp/murmur")));
        assert_eq!(cfg.tts.request_timeout_secs, Some(5));
        assert_eq!(cfg.temp_dir(), PathBuf::from("/tmp/murmur"));
        assert_eq!(cfg.playback.poll_interval_ms, 250);
        assert_eq!(cfg.playback.local_player.as_deref(), Some("mpg123"));
        assert_eq!(cfg.ai.provider, "mock");
        assert_eq!(cfg.ai.max_output_tokens, 256);
        assert_eq!(cfg.qa.fallback, "dunno");
        assert_eq!(cfg.qa.entries.get("who are you").unwrap(), "a parrot");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_out_of_range_speed_is_invalid() {
        let cfg: MurmurConfig = toml::from_str("[tts]\ndefault_speed = 2.5\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_unknown_ai_provider_is_invalid() {
        let cfg: MurmurConfig = toml::from_str("[ai]\nprovider = \"openai\"\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let cfg = MurmurConfig::default();
        assert!(cfg.require_platform_token().is_err());
        assert!(cfg.ai_key().is_none());

        let cfg = MurmurConfig {
            secrets: Secrets {
                discord_token: Some("abc".to_string()),
                gemini_api_key: None,
            },
            ..Default::default()
        };
        assert_eq!(cfg.require_platform_token().unwrap(), "abc");
    }

    #[test]
    fn test_secrets_are_redacted_in_debug() {
        let secrets = Secrets {
            discord_token: Some("very-secret".to_string()),
            gemini_api_key: Some("also-secret".to_string()),
        };
        let rendered = format!("{:?}", secrets);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_env_overrides_and_defaults() {
        // Part 1: env overrides
        std::env::set_var("MURMUR_LANGUAGE", "en");
        std::env::set_var("GEMINI_MODEL", "gemini-test");

        let mut cfg = MurmurConfig::default();
        cfg.apply_env_overrides();

        assert_eq!(cfg.tts.language, "en");
        assert_eq!(cfg.ai.model, "gemini-test");

        // Clean up env vars before testing defaults
        std::env::remove_var("MURMUR_LANGUAGE");
        std::env::remove_var("GEMINI_MODEL");

        // Part 2: nonexistent path returns defaults (no env interference)
        let cfg = MurmurConfig::load_or_default("/nonexistent/path.toml");
        assert_eq!(cfg.tts.language, "th");
    }
}
