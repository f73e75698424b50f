//! Text-to-Speech (TTS) trait definition and the Google Translate backend

use crate::resource::{temp_audio_path, AudioFormat, AudioResource};
use anyhow::{Context, Result};
use async_trait::async_trait;
use murmur_core::config::TtsConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Longest chunk the translate endpoint accepts in one request.
pub const MAX_CHUNK_CHARS: usize = 100;

/// Text-to-Speech trait for synthesizing audio from text
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize text to a temporary audio file
    ///
    /// # Arguments
    /// * `text` - Arbitrary user-supplied text, any length, any script
    /// * `language` - Language tag such as `th` or `en`
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioResource>;

    /// Get the name of this TTS provider
    fn provider_name(&self) -> &'static str;
}

/// Speech from Google Translate's public `translate_tts` endpoint.
///
/// Long text is split into chunks of at most [`MAX_CHUNK_CHARS`] characters,
/// fetched in order, and the MP3 payloads are concatenated into one file.
pub struct GoogleTts {
    client: reqwest::Client,
    base_url: String,
    temp_dir: PathBuf,
}

impl GoogleTts {
    pub fn new(base_url: &str, temp_dir: PathBuf, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            temp_dir,
        })
    }

    pub fn from_config(config: &TtsConfig, temp_dir: PathBuf) -> Result<Self> {
        Self::new(
            &config.base_url,
            temp_dir,
            config.request_timeout_secs.map(Duration::from_secs),
        )
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        language: &str,
        idx: usize,
        total: usize,
    ) -> Result<Vec<u8>> {
        let url = format!("{}/translate_tts", self.base_url);
        let total = total.to_string();
        let index = idx.to_string();
        let textlen = chunk.chars().count().to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", language),
                ("total", total.as_str()),
                ("idx", index.as_str()),
                ("textlen", textlen.as_str()),
                ("client", "tw-ob"),
            ])
            .send()
            .await
            .context("Failed to send request to Google TTS")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "Google TTS error ({}): {}",
                status,
                error_text.chars().take(200).collect::<String>()
            );
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            anyhow::bail!("Google TTS returned no audio for chunk {}/{}", idx + 1, total);
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<AudioResource> {
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            anyhow::bail!("Nothing to synthesize");
        }

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let bytes = self.fetch_chunk(chunk, language, idx, chunks.len()).await?;
            audio.extend_from_slice(&bytes);
        }

        // Owned before the write so a failed write does not leave a stray file
        let resource = AudioResource::temporary(
            temp_audio_path(&self.temp_dir, AudioFormat::Mp3),
            AudioFormat::Mp3,
        );
        tokio::fs::write(resource.path(), &audio)
            .await
            .with_context(|| format!("Failed to write {}", resource.path().display()))?;

        tracing::debug!(
            "Synthesized {} chunk(s), {} bytes into {}",
            chunks.len(),
            audio.len(),
            resource.path().display()
        );
        Ok(resource)
    }

    fn provider_name(&self) -> &'static str {
        "google-translate"
    }
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Prefers whitespace and punctuation boundaries; a run longer than
/// `max_chars` with no boundary (common in Thai, which has no spaces between
/// words) is cut at a character boundary. Chunks are trimmed and never empty.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    const BREAKS: [char; 12] = ['.', ',', '!', '?', ';', ':', '。', '，', '！', '？', '、', '…'];

    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for token in text.split_inclusive(|c: char| c.is_whitespace() || BREAKS.contains(&c)) {
        let token_len = token.chars().count();

        if current_len + token_len > max_chars {
            push_trimmed(&mut chunks, &current);
            current.clear();
            current_len = 0;
        }

        if token_len > max_chars {
            let chars: Vec<char> = token.chars().collect();
            let mut pieces = chars.chunks(max_chars).peekable();
            while let Some(piece) = pieces.next() {
                if pieces.peek().is_some() {
                    push_trimmed(&mut chunks, &piece.iter().collect::<String>());
                } else {
                    current = piece.iter().collect();
                    current_len = piece.len();
                }
            }
            continue;
        }

        current.push_str(token);
        current_len += token_len;
    }
    push_trimmed(&mut chunks, &current);

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, part: &str) {
    let trimmed = part.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn strip_ws(s: &str) -> String {
        s.chars().filter(|c| !c.is_whitespace()).collect()
    }

    #[test]
    fn test_split_short_text_is_one_chunk() {
        assert_eq!(split_text("hello world", 100), vec!["hello world"]);
    }

    #[test]
    fn test_split_empty_and_blank() {
        assert!(split_text("", 100).is_empty());
        assert!(split_text("   \n\t ", 100).is_empty());
    }

    #[test]
    fn test_split_respects_limit_and_order() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(10);
        let chunks = split_text(&text, 30);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 30, "chunk too long: {:?}", chunk);
        }
        assert_eq!(strip_ws(&chunks.concat()), strip_ws(&text));
    }

    #[test]
    fn test_split_thai_without_spaces() {
        let text = "สวัสดีครับ".repeat(25); // 250 chars, no boundaries
        let chunks = split_text(&text, 100);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
        assert_eq!(chunks.concat(), text);
    }

    #[tokio::test]
    async fn test_synthesize_concatenates_chunks() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .and(query_param("tl", "th"))
            .and(query_param("client", "tw-ob"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"MP3".to_vec()))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let tts = GoogleTts::new(&server.uri(), dir.path().to_path_buf(), None)
            .unwrap();

        let text = "ก".repeat(150);
        let resource = tts.synthesize(&text, "th").await.unwrap();
        assert_eq!(std::fs::read(resource.path()).unwrap(), b"MP3MP3");
        assert!(resource.path().starts_with(dir.path()));

        let path = resource.path().to_path_buf();
        resource.release().unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_synthesize_http_error_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let tts = GoogleTts::new(&server.uri(), dir.path().to_path_buf(), Some(Duration::from_secs(5)))
            .unwrap();

        let err = tts.synthesize("hello", "en").await.unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_timeout_applies_only_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/translate_tts"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"MP3".to_vec())
                    .set_delay(Duration::from_millis(300)),
            )
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let hasty = GoogleTts::new(
            &server.uri(),
            dir.path().to_path_buf(),
            Some(Duration::from_millis(50)),
        )
        .unwrap();
        assert!(hasty.synthesize("hello", "en").await.is_err());

        let patient = GoogleTts::from_config(
            &TtsConfig {
                base_url: server.uri(),
                ..TtsConfig::default()
            },
            dir.path().to_path_buf(),
        )
        .unwrap();
        let resource = patient.synthesize("hello", "en").await.unwrap();
        assert_eq!(std::fs::read(resource.path()).unwrap(), b"MP3");
    }

    #[tokio::test]
    async fn test_synthesize_empty_text_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tts = GoogleTts::new("http://127.0.0.1:9", dir.path().to_path_buf(), Some(Duration::from_secs(1)))
            .unwrap();
        assert!(tts.synthesize("  ", "th").await.is_err());
    }
}
