//! Discord platform: serenity gateway client with songbird voice.

use crate::bot::{Bot, Responder, VoiceChannel, VoiceConnector};
use crate::services::Services;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use murmur_core::{ChannelId, IncomingMessage, ServerId, UserId};
use murmur_playback::{
    completion_channel, Completion, CompletionNotifier, PlaybackBackend, PlaybackError,
};
use murmur_voice::AudioResource;
use serenity::all as discord;
use songbird::tracks::{PlayMode, TrackHandle};
use songbird::{Event, EventContext, SerenityInit, Songbird, TrackEvent};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use tokio::sync::Mutex;

/// Longest message Discord accepts, in characters.
const MESSAGE_LIMIT: usize = 2000;

fn guild_id(server: ServerId) -> discord::GuildId {
    discord::GuildId::new(server.get())
}

fn channel_id(channel: ChannelId) -> discord::ChannelId {
    discord::ChannelId::new(channel.get())
}

fn truncate_for_discord(text: &str) -> String {
    if text.chars().count() <= MESSAGE_LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(MESSAGE_LIMIT - 1).collect();
    cut.push('…');
    cut
}

// ============================================================================
// Playback backend
// ============================================================================

/// Plays files into a songbird call. Completion is driven by track events.
pub struct SongbirdBackend {
    guild: discord::GuildId,
    songbird: Arc<Songbird>,
    track: Mutex<Option<TrackHandle>>,
}

struct TrackFinished {
    notifier: Arc<StdMutex<Option<CompletionNotifier>>>,
    errored: bool,
}

#[async_trait]
impl songbird::EventHandler for TrackFinished {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let notifier = self.notifier.lock().ok().and_then(|mut slot| slot.take());
        if let Some(notifier) = notifier {
            let outcome = if self.errored {
                Err(PlaybackError::Failed("track playback error".to_string()))
            } else {
                Ok(())
            };
            notifier.notify(outcome);
        }
        None
    }
}

/// The track-handle operations the backend relies on.
trait TrackControl {
    fn on_finish(&self, event: TrackEvent, handler: TrackFinished) -> Result<(), String>;
    fn halt(&self);
}

impl TrackControl for TrackHandle {
    fn on_finish(&self, event: TrackEvent, handler: TrackFinished) -> Result<(), String> {
        self.add_event(Event::Track(event), handler)
            .map_err(|e| e.to_string())
    }

    fn halt(&self) {
        if let Err(e) = self.stop() {
            tracing::warn!("Failed to stop track: {}", e);
        }
    }
}

/// Wire end/error events of a started track to a completion. If that fails
/// the track is stopped, so it never plays unobserved.
fn arm_track(track: &impl TrackControl) -> Result<Completion, PlaybackError> {
    let (notifier, completion) = completion_channel();
    let notifier = Arc::new(StdMutex::new(Some(notifier)));
    for (event, errored) in [(TrackEvent::End, false), (TrackEvent::Error, true)] {
        let handler = TrackFinished {
            notifier: Arc::clone(&notifier),
            errored,
        };
        if let Err(e) = track.on_finish(event, handler) {
            track.halt();
            return Err(PlaybackError::Failed(e));
        }
    }
    Ok(completion)
}

#[async_trait]
impl PlaybackBackend for SongbirdBackend {
    async fn is_connected(&self) -> bool {
        match self.songbird.get(self.guild) {
            Some(call) => call.lock().await.current_connection().is_some(),
            None => false,
        }
    }

    async fn is_playing(&self) -> bool {
        let track = self.track.lock().await.clone();
        match track {
            Some(handle) => handle
                .get_info()
                .await
                .map(|state| matches!(state.playing, PlayMode::Play))
                .unwrap_or(false),
            None => false,
        }
    }

    async fn play(&self, resource: &AudioResource) -> Result<Completion, PlaybackError> {
        let call = self
            .songbird
            .get(self.guild)
            .ok_or(PlaybackError::NotConnected)?;
        let input = songbird::input::File::new(resource.path().to_path_buf());
        let handle = call.lock().await.play_input(input.into());
        *self.track.lock().await = Some(handle.clone());
        arm_track(&handle)
    }

    async fn disconnect(&self) -> Result<()> {
        self.songbird
            .remove(self.guild)
            .await
            .context("Failed to leave voice channel")
    }
}

// ============================================================================
// Platform adapters
// ============================================================================

struct DiscordResponder {
    http: Arc<discord::Http>,
}

#[async_trait]
impl Responder for DiscordResponder {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<()> {
        channel_id(channel)
            .say(self.http.as_ref(), truncate_for_discord(text))
            .await
            .context("Failed to send Discord message")?;
        Ok(())
    }
}

struct DiscordVoice {
    cache: Arc<discord::Cache>,
    songbird: Arc<Songbird>,
}

impl DiscordVoice {
    fn channel_name(&self, guild: discord::GuildId, channel: discord::ChannelId) -> String {
        self.cache
            .guild(guild)
            .and_then(|g| g.channels.get(&channel).map(|c| c.name.clone()))
            .unwrap_or_else(|| channel.to_string())
    }

    fn is_bot(&self, state: &discord::VoiceState) -> bool {
        state
            .member
            .as_ref()
            .map(|m| m.user.bot)
            .or_else(|| self.cache.user(state.user_id).map(|u| u.bot))
            .unwrap_or(false)
    }
}

#[async_trait]
impl VoiceConnector for DiscordVoice {
    async fn user_channel(&self, server: ServerId, user: UserId) -> Option<VoiceChannel> {
        let id = {
            let guild = self.cache.guild(guild_id(server))?;
            guild
                .voice_states
                .get(&discord::UserId::new(user.get()))?
                .channel_id?
        };
        Some(VoiceChannel {
            id: ChannelId(id.get()),
            name: self.channel_name(guild_id(server), id),
        })
    }

    async fn current_channel(&self, server: ServerId) -> Option<VoiceChannel> {
        let call = self.songbird.get(guild_id(server))?;
        let current = call.lock().await.current_channel()?;
        let id = discord::ChannelId::new(current.0.get());
        Some(VoiceChannel {
            id: ChannelId(id.get()),
            name: self.channel_name(guild_id(server), id),
        })
    }

    async fn connect(
        &self,
        server: ServerId,
        channel: &VoiceChannel,
    ) -> Result<Arc<dyn PlaybackBackend>> {
        let guild = guild_id(server);
        self.songbird
            .join(guild, channel_id(channel.id))
            .await
            .with_context(|| format!("Failed to join {}", channel.name))?;
        Ok(Arc::new(SongbirdBackend {
            guild,
            songbird: Arc::clone(&self.songbird),
            track: Mutex::new(None),
        }))
    }

    async fn move_to(&self, server: ServerId, channel: &VoiceChannel) -> Result<()> {
        self.songbird
            .join(guild_id(server), channel_id(channel.id))
            .await
            .with_context(|| format!("Failed to move to {}", channel.name))?;
        Ok(())
    }

    async fn disconnect(&self, server: ServerId) -> Result<()> {
        self.songbird
            .remove(guild_id(server))
            .await
            .context("Failed to leave voice channel")
    }

    async fn listener_count(&self, server: ServerId, channel: ChannelId) -> usize {
        let own_id = self.cache.current_user().id;
        let target = channel_id(channel);
        let Some(guild) = self.cache.guild(guild_id(server)) else {
            return 0;
        };
        guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(target))
            .filter(|state| state.user_id != own_id && !self.is_bot(state))
            .count()
    }
}

// ============================================================================
// Gateway events
// ============================================================================

struct Handler {
    bot: Arc<OnceLock<Arc<Bot>>>,
}

/// Flatten a gateway message into the platform-neutral form.
fn normalize(ctx: &discord::Context, msg: &discord::Message) -> IncomingMessage {
    let (server_name, channel_name, author_roles) =
        match msg.guild_id.and_then(|g| ctx.cache.guild(g)) {
            Some(guild) => {
                let channel_name = guild
                    .channels
                    .get(&msg.channel_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| msg.channel_id.to_string());
                let roles = msg
                    .member
                    .as_ref()
                    .map(|member| {
                        member
                            .roles
                            .iter()
                            .filter_map(|id| guild.roles.get(id).map(|r| r.name.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                (guild.name.clone(), channel_name, roles)
            }
            None => (String::new(), msg.channel_id.to_string(), Vec::new()),
        };

    let author_name = msg
        .member
        .as_ref()
        .and_then(|m| m.nick.clone())
        .or_else(|| msg.author.global_name.clone())
        .unwrap_or_else(|| msg.author.name.clone());

    IncomingMessage {
        server: msg.guild_id.map(|g| ServerId(g.get())),
        server_name,
        channel: ChannelId(msg.channel_id.get()),
        channel_name,
        author: UserId(msg.author.id.get()),
        author_name,
        author_is_bot: msg.author.bot,
        author_roles,
        content: msg.content.clone(),
        timestamp: msg.timestamp.unix_timestamp(),
    }
}

#[async_trait]
impl discord::EventHandler for Handler {
    async fn ready(&self, _ctx: discord::Context, ready: discord::Ready) {
        let Some(bot) = self.bot.get() else {
            return;
        };
        let servers: Vec<ServerId> = ready.guilds.iter().map(|g| ServerId(g.id.get())).collect();
        tracing::info!("Logged in to Discord as {}", ready.user.name);
        bot.on_ready(UserId(ready.user.id.get()), &servers).await;
    }

    async fn guild_create(
        &self,
        _ctx: discord::Context,
        guild: discord::Guild,
        _is_new: Option<bool>,
    ) {
        if let Some(bot) = self.bot.get() {
            bot.on_server_join(ServerId(guild.id.get())).await;
        }
    }

    async fn message(&self, ctx: discord::Context, msg: discord::Message) {
        let Some(bot) = self.bot.get() else {
            return;
        };
        let incoming = normalize(&ctx, &msg);
        bot.on_message(&incoming).await;
    }

    async fn voice_state_update(
        &self,
        _ctx: discord::Context,
        _old: Option<discord::VoiceState>,
        new: discord::VoiceState,
    ) {
        let (Some(bot), Some(guild)) = (self.bot.get(), new.guild_id) else {
            return;
        };
        bot.on_voice_state_update(ServerId(guild.get())).await;
    }
}

/// Connect to the gateway and serve until the client stops or Ctrl-C.
pub async fn run(services: Services, token: &str) -> Result<()> {
    let intents = discord::GatewayIntents::GUILDS
        | discord::GatewayIntents::GUILD_MESSAGES
        | discord::GatewayIntents::MESSAGE_CONTENT
        | discord::GatewayIntents::GUILD_VOICE_STATES;

    let songbird = Songbird::serenity();
    let slot: Arc<OnceLock<Arc<Bot>>> = Arc::new(OnceLock::new());
    let mut client = discord::Client::builder(token, intents)
        .event_handler(Handler {
            bot: Arc::clone(&slot),
        })
        .register_songbird_with(Arc::clone(&songbird))
        .await
        .context("Failed to create Discord client")?;

    let bot = Arc::new(Bot::new(
        services,
        Arc::new(DiscordResponder {
            http: Arc::clone(&client.http),
        }),
        Arc::new(DiscordVoice {
            cache: Arc::clone(&client.cache),
            songbird,
        }),
    ));
    if slot.set(Arc::clone(&bot)).is_err() {
        anyhow::bail!("Discord handler initialised twice");
    }

    let shard_manager = Arc::clone(&client.shard_manager);
    let registry = Arc::clone(bot.registry());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutting down");
            registry.shutdown_all().await;
            shard_manager.shutdown_all().await;
        }
    });

    client
        .start()
        .await
        .context("Discord client stopped with an error")?;
    bot.registry().shutdown_all().await;
    Ok(())
}
