//! Terminal platform: a single simulated server driven from stdin, with audio
//! played through a local player process.

use crate::bot::{Bot, Responder, VoiceChannel, VoiceConnector};
use crate::services::Services;
use anyhow::{Context, Result};
use async_trait::async_trait;
use murmur_core::{ChannelId, IncomingMessage, ServerId, UserId};
use murmur_playback::{completion_channel, Completion, PlaybackBackend, PlaybackError};
use murmur_voice::AudioResource;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{Mutex, Notify};

pub const SERVER: ServerId = ServerId(1);
const BOT_USER: UserId = UserId(0);
const CONSOLE_USER: UserId = UserId(1);
const VOICE_CHANNEL: ChannelId = ChannelId(100);

/// Players tried in order when none is configured.
const PLAYERS: &[&str] = &["ffplay", "mpg123", "paplay"];

// ============================================================================
// Local player backend
// ============================================================================

/// Plays each file with a short-lived player process.
pub struct LocalPlayer {
    bin: PathBuf,
    connected: AtomicBool,
    playing: Arc<AtomicBool>,
    stop: Arc<Notify>,
}

impl LocalPlayer {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            connected: AtomicBool::new(true),
            playing: Arc::new(AtomicBool::new(false)),
            stop: Arc::new(Notify::new()),
        }
    }

    fn command(&self, file: &Path) -> tokio::process::Command {
        let name = self
            .bin
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let mut cmd = tokio::process::Command::new(&self.bin);
        match name {
            "ffplay" => {
                cmd.args(["-autoexit", "-nodisp", "-loglevel", "quiet"]);
            }
            "mpg123" => {
                cmd.arg("-q");
            }
            _ => {}
        }
        cmd.arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl PlaybackBackend for LocalPlayer {
    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn is_playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    async fn play(&self, resource: &AudioResource) -> Result<Completion, PlaybackError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PlaybackError::NotConnected);
        }
        let mut child = self.command(resource.path()).spawn().map_err(|e| {
            PlaybackError::Failed(format!("failed to start {}: {}", self.bin.display(), e))
        })?;
        self.playing.store(true, Ordering::SeqCst);

        let (notifier, completion) = completion_channel();
        let playing = Arc::clone(&self.playing);
        let stop = Arc::clone(&self.stop);
        let bin = self.bin.display().to_string();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                status = child.wait() => match status {
                    Ok(s) if s.success() => Ok(()),
                    Ok(s) => Err(PlaybackError::Failed(format!("{} exited with {}", bin, s))),
                    Err(e) => Err(PlaybackError::Failed(e.to_string())),
                },
                _ = stop.notified() => {
                    let _ = child.kill().await;
                    Err(PlaybackError::NotConnected)
                }
            };
            playing.store(false, Ordering::SeqCst);
            notifier.notify(outcome);
        });
        Ok(completion)
    }

    async fn disconnect(&self) -> Result<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.stop.notify_one();
        Ok(())
    }
}

/// Resolve the player binary: the configured one if it exists, otherwise the
/// first known player on `PATH`.
pub fn select_player(preferred: Option<&str>) -> Option<PathBuf> {
    if let Some(p) = preferred {
        let path = Path::new(p);
        if path.components().count() > 1 && path.is_file() {
            return Some(path.to_path_buf());
        }
        if let Some(found) = find_in_path(p) {
            return Some(found);
        }
        tracing::warn!("Configured player '{}' not found, trying defaults", p);
    }
    PLAYERS.iter().find_map(|name| find_in_path(name))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

// ============================================================================
// Platform adapters
// ============================================================================

pub struct ConsoleResponder;

#[async_trait]
impl Responder for ConsoleResponder {
    async fn send(&self, _channel: ChannelId, text: &str) -> Result<()> {
        println!("murmur> {}", text);
        Ok(())
    }
}

/// The console user always sits in one voice channel; the bot joins it by
/// starting a local player.
pub struct ConsoleVoice {
    player_bin: Option<PathBuf>,
    active: Mutex<Option<Arc<LocalPlayer>>>,
}

impl ConsoleVoice {
    pub fn new(player_bin: Option<PathBuf>) -> Self {
        Self {
            player_bin,
            active: Mutex::new(None),
        }
    }

    fn channel() -> VoiceChannel {
        VoiceChannel {
            id: VOICE_CHANNEL,
            name: "Console".to_string(),
        }
    }
}

#[async_trait]
impl VoiceConnector for ConsoleVoice {
    async fn user_channel(&self, _server: ServerId, _user: UserId) -> Option<VoiceChannel> {
        Some(Self::channel())
    }

    async fn current_channel(&self, _server: ServerId) -> Option<VoiceChannel> {
        let active = self.active.lock().await;
        match active.as_ref() {
            Some(player) if player.is_connected().await => Some(Self::channel()),
            _ => None,
        }
    }

    async fn connect(
        &self,
        _server: ServerId,
        _channel: &VoiceChannel,
    ) -> Result<Arc<dyn PlaybackBackend>> {
        let bin = self
            .player_bin
            .clone()
            .context("no audio player found (install ffmpeg or mpg123, or set MURMUR_PLAYER)")?;
        let player = Arc::new(LocalPlayer::new(bin));
        *self.active.lock().await = Some(Arc::clone(&player));
        Ok(player)
    }

    async fn move_to(&self, _server: ServerId, _channel: &VoiceChannel) -> Result<()> {
        Ok(())
    }

    async fn disconnect(&self, _server: ServerId) -> Result<()> {
        if let Some(player) = self.active.lock().await.take() {
            player.disconnect().await?;
        }
        Ok(())
    }

    async fn listener_count(&self, _server: ServerId, _channel: ChannelId) -> usize {
        1
    }
}

// ============================================================================
// REPL
// ============================================================================

/// Text channel names typed as `#name message`, mapped to stable ids.
#[derive(Debug)]
struct ChannelBook {
    ids: HashMap<String, ChannelId>,
}

impl ChannelBook {
    fn new() -> Self {
        let mut ids = HashMap::new();
        ids.insert("general".to_string(), ChannelId(1));
        Self { ids }
    }

    fn id(&mut self, name: &str) -> ChannelId {
        let next = ChannelId(self.ids.len() as u64 + 1);
        *self.ids.entry(name.to_string()).or_insert(next)
    }
}

/// Split `#name message` into channel and content. Plain lines go to `general`.
fn route(line: &str) -> (&str, &str) {
    if let Some(rest) = line.strip_prefix('#') {
        if let Some((name, content)) = rest.split_once(char::is_whitespace) {
            if !name.is_empty() {
                return (name, content.trim());
            }
        }
    }
    ("general", line)
}

pub async fn run(services: Services, preferred_player: Option<&str>) -> Result<()> {
    let player = select_player(preferred_player);
    match &player {
        Some(bin) => tracing::info!("Local audio player: {}", bin.display()),
        None => tracing::warn!("No audio player found, joining voice will fail"),
    }

    // The console user owns the simulated server
    let roles = vec![services.bot.owner_role.clone()];
    let prefix = services.bot.command_prefix.clone();
    let bot = Bot::new(
        services,
        Arc::new(ConsoleResponder),
        Arc::new(ConsoleVoice::new(player)),
    );
    bot.on_ready(BOT_USER, &[SERVER]).await;

    println!(
        "Murmur console. Try `{p}join`, then type to have it read aloud. \
         `#channel text` posts elsewhere, `/quit` exits.",
        p = prefix
    );

    let mut channels = ChannelBook::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => line,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/quit" || line == "/exit" {
            break;
        }

        let (channel_name, content) = route(line);
        let msg = IncomingMessage {
            server: Some(SERVER),
            server_name: "console".to_string(),
            channel: channels.id(channel_name),
            channel_name: channel_name.to_string(),
            author: CONSOLE_USER,
            author_name: "you".to_string(),
            author_is_bot: false,
            author_roles: roles.clone(),
            content: content.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        };
        bot.on_message(&msg).await;
    }

    bot.registry().shutdown_all().await;
    Ok(())
}
