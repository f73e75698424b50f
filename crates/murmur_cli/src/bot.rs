//! Platform-neutral bot: turns chat and voice events into session lifecycle
//! changes, speech enqueues and command replies.

use crate::commands::{Command, CommandError};
use crate::services::Services;
use anyhow::Result;
use async_trait::async_trait;
use murmur_core::{ChannelId, IncomingMessage, ServerId, UserId};
use murmur_playback::{EnqueueOutcome, Origin, PlaybackBackend, SessionRegistry};
use std::sync::{Arc, OnceLock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceChannel {
    pub id: ChannelId,
    pub name: String,
}

/// Sends text replies back to the platform.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn send(&self, channel: ChannelId, text: &str) -> Result<()>;
}

/// Voice-side access to the platform.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// Voice channel `user` is sitting in, if any.
    async fn user_channel(&self, server: ServerId, user: UserId) -> Option<VoiceChannel>;
    /// Voice channel the bot itself is connected to.
    async fn current_channel(&self, server: ServerId) -> Option<VoiceChannel>;
    /// Connect and hand back a backend bound to the new connection.
    async fn connect(
        &self,
        server: ServerId,
        channel: &VoiceChannel,
    ) -> Result<Arc<dyn PlaybackBackend>>;
    async fn move_to(&self, server: ServerId, channel: &VoiceChannel) -> Result<()>;
    async fn disconnect(&self, server: ServerId) -> Result<()>;
    /// Non-bot members currently in `channel`.
    async fn listener_count(&self, server: ServerId, channel: ChannelId) -> usize;
}

pub struct Bot {
    services: Services,
    responder: Arc<dyn Responder>,
    voice: Arc<dyn VoiceConnector>,
    own_id: OnceLock<UserId>,
}

impl Bot {
    pub fn new(
        services: Services,
        responder: Arc<dyn Responder>,
        voice: Arc<dyn VoiceConnector>,
    ) -> Self {
        Self {
            services,
            responder,
            voice,
            own_id: OnceLock::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.services.registry
    }

    fn prefix(&self) -> &str {
        &self.services.bot.command_prefix
    }

    // ------------------------------------------------------------------
    // Platform events
    // ------------------------------------------------------------------

    /// Connected to the platform. Every visible server starts restricted.
    pub async fn on_ready(&self, own_id: UserId, servers: &[ServerId]) {
        if self.own_id.set(own_id).is_err() {
            tracing::debug!("Reconnected, keeping existing identity");
        }
        for server in servers {
            self.registry().policy().register_server(*server).await;
        }
        tracing::info!(
            user = %own_id,
            servers = servers.len(),
            "Bot ready, prefix '{}'",
            self.prefix()
        );
    }

    pub async fn on_server_join(&self, server: ServerId) {
        self.registry().policy().register_server(server).await;
    }

    pub async fn on_message(&self, msg: &IncomingMessage) {
        if self.own_id.get() == Some(&msg.author) {
            return;
        }
        if msg.server.is_some() {
            tracing::info!(target: "chat", "{}", msg.log_line());
        }

        if let Some(parsed) = Command::parse(self.prefix(), &msg.content) {
            self.dispatch(msg, parsed).await;
            return;
        }

        let Some(server) = msg.server else {
            return;
        };
        let origin = Origin::Chat {
            channel: msg.channel,
        };
        let outcome = self.registry().enqueue(server, &msg.content, origin).await;
        tracing::debug!(server = %server, ?outcome, "Chat message handled");
    }

    /// Someone's voice state changed in `server`. Stops playback when the
    /// bot lost its connection, and leaves when nobody is left to listen.
    pub async fn on_voice_state_update(&self, server: ServerId) {
        let Some(channel) = self.voice.current_channel(server).await else {
            if self.registry().destroy_session(server).await {
                tracing::info!(server = %server, "Voice connection lost, playback stopped");
            }
            return;
        };

        if self.voice.listener_count(server, channel.id).await > 0 {
            return;
        }
        tracing::info!(
            server = %server,
            "No listeners left in {}, leaving the voice channel",
            channel.name
        );
        self.registry().destroy_session(server).await;
        if let Err(e) = self.voice.disconnect(server).await {
            tracing::error!(server = %server, "Failed to leave voice channel: {:#}", e);
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    async fn dispatch(&self, msg: &IncomingMessage, parsed: Result<Command, CommandError>) {
        let command = match parsed {
            Ok(command) => command,
            Err(CommandError::Unknown(name)) => {
                tracing::debug!("Ignoring unknown command '{}'", name);
                return;
            }
            Err(CommandError::MissingArgument { usage }) => {
                self.reply(msg, &replies::usage(self.prefix(), usage)).await;
                return;
            }
            Err(CommandError::BadNumber(_)) => {
                self.reply(msg, &replies::speed_format(self.prefix())).await;
                return;
            }
        };

        if let Command::SetSpeed(speed) = command {
            self.set_speed(msg, speed).await;
            return;
        }

        let Some(server) = msg.server else {
            self.reply(msg, replies::SERVER_ONLY).await;
            return;
        };

        let owner_role = &self.services.bot.owner_role;
        if command.requires_owner() && !msg.author_has_role(owner_role) {
            tracing::warn!(
                server = %server,
                user = %msg.author,
                "Rejected {:?}: missing role '{}'",
                command,
                owner_role
            );
            self.reply(msg, &replies::missing_role(owner_role)).await;
            return;
        }

        match command {
            Command::SetSpeed(_) => {}
            Command::Join => self.join(msg, server).await,
            Command::Leave => self.leave(msg, server).await,
            Command::ReadAll => {
                let changed = self.registry().policy().enable_read_all(server).await;
                let text = if changed {
                    replies::READ_ALL_ON
                } else {
                    replies::READ_ALL_ALREADY
                };
                self.reply(msg, text).await;
            }
            Command::RestrictChannels => {
                let changed = self.registry().policy().restrict(server, msg.channel).await;
                let text = if changed {
                    replies::RESTRICTED_ON
                } else {
                    replies::RESTRICTED_ALREADY
                };
                self.reply(msg, text).await;
            }
            Command::ReadMode => {
                let mode = self.registry().policy().mode(server).await;
                self.reply(msg, &replies::read_mode(mode, self.prefix())).await;
            }
            Command::Ai(question) => self.ask_ai(msg, server, &question).await,
            Command::Ask(question) => self.ask_scripted(msg, server, &question).await,
        }
    }

    async fn set_speed(&self, msg: &IncomingMessage, speed: f32) {
        match self.services.speed.set(speed) {
            Ok(speed) => {
                tracing::info!("Speech speed set to {}x by {}", speed, msg.author_name);
                self.reply(msg, &replies::speed_set(speed)).await;
            }
            Err(e) => {
                tracing::debug!("Rejected speed: {}", e);
                self.reply(msg, replies::SPEED_RANGE).await;
            }
        }
    }

    async fn join(&self, msg: &IncomingMessage, server: ServerId) {
        let Some(target) = self.voice.user_channel(server, msg.author).await else {
            self.reply(msg, replies::NEED_VOICE).await;
            return;
        };
        self.registry().policy().designate(server, msg.channel).await;

        if let Some(current) = self.voice.current_channel(server).await {
            if current.id == target.id {
                self.reply(msg, &replies::already_in(&current.name)).await;
                return;
            }
            match self.voice.move_to(server, &target).await {
                Ok(()) => {
                    tracing::info!(server = %server, "Moved to voice channel {}", target.name);
                    self.reply(msg, &replies::moved(&target.name)).await;
                }
                Err(e) => {
                    tracing::error!(server = %server, "Failed to move voice channel: {:#}", e);
                    self.reply(msg, &replies::join_failed(&e)).await;
                }
            }
            return;
        }

        match self.voice.connect(server, &target).await {
            Ok(backend) => {
                self.registry().create_session(server, backend).await;
                tracing::info!(server = %server, "Joined voice channel {}", target.name);
                self.reply(msg, &replies::joined(&target.name)).await;
            }
            Err(e) => {
                tracing::error!(server = %server, "Failed to join voice channel: {:#}", e);
                self.reply(msg, &replies::join_failed(&e)).await;
            }
        }
    }

    async fn leave(&self, msg: &IncomingMessage, server: ServerId) {
        if self.voice.current_channel(server).await.is_none() {
            self.reply(msg, replies::NOT_IN_VOICE).await;
            return;
        }
        self.registry().destroy_session(server).await;
        self.registry().policy().clear_designated(server).await;
        if let Err(e) = self.voice.disconnect(server).await {
            tracing::error!(server = %server, "Failed to leave voice channel: {:#}", e);
        }
        self.reply(msg, replies::LEFT).await;
    }

    async fn ask_ai(&self, msg: &IncomingMessage, server: ServerId, question: &str) {
        let Some(ai) = self.services.ai.as_ref() else {
            self.reply(msg, replies::AI_DISABLED).await;
            return;
        };
        if !self.registry().has_session(server).await {
            self.reply(msg, &replies::not_ready(self.prefix())).await;
            return;
        }

        self.reply(msg, replies::AI_THINKING).await;
        match ai.complete(question, self.services.ai_params.clone()).await {
            Ok(answer) => {
                self.reply(msg, &replies::ai_answer(question, &answer)).await;
                self.speak(server, &answer).await;
            }
            Err(e) => {
                tracing::error!(
                    server = %server,
                    provider = ai.provider_name(),
                    "AI completion failed: {:#}",
                    e
                );
                self.reply(msg, replies::AI_FAILED).await;
            }
        }
    }

    async fn ask_scripted(&self, msg: &IncomingMessage, server: ServerId, question: &str) {
        if !self.registry().has_session(server).await {
            self.reply(msg, &replies::not_ready(self.prefix())).await;
            return;
        }
        let answer = self.services.qa.answer(question).to_string();
        self.reply(msg, &replies::scripted_answer(&answer)).await;
        if self.speak(server, &answer).await == EnqueueOutcome::NoSession {
            self.reply(msg, replies::SPEAK_FAILED).await;
        }
    }

    /// Queue a command answer for speech. Bypasses the read policy.
    async fn speak(&self, server: ServerId, text: &str) -> EnqueueOutcome {
        let outcome = self
            .registry()
            .enqueue(server, text, Origin::CommandReply)
            .await;
        if outcome != EnqueueOutcome::Queued {
            tracing::warn!(server = %server, ?outcome, "Answer was not queued for speech");
        }
        outcome
    }

    async fn reply(&self, msg: &IncomingMessage, text: &str) {
        if let Err(e) = self.responder.send(msg.channel, text).await {
            tracing::error!(channel = %msg.channel, "Failed to send reply: {:#}", e);
        }
    }
}

/// User-facing reply texts.
pub mod replies {
    use murmur_core::ReadMode;

    pub const SERVER_ONLY: &str = "❌ คำสั่งนี้ใช้ได้เฉพาะในเซิร์ฟเวอร์ครับ";
    pub const SPEED_RANGE: &str = "❌ โปรดระบุความเร็วระหว่าง 0.5 ถึง 2.0 ครับ";
    pub const NEED_VOICE: &str = "คุณต้องอยู่ในช่องเสียงก่อนจึงจะเรียกใช้คำสั่งนี้ได้!";
    pub const NOT_IN_VOICE: &str = "❌ บอทไม่ได้อยู่ในช่องเสียงใดๆ!";
    pub const LEFT: &str = "👋 ออกจากช่องเสียงแล้ว.";
    pub const READ_ALL_ON: &str = "✅ เปลี่ยนโหมด: บอทสายลับกำลังทำงาน";
    pub const READ_ALL_ALREADY: &str = "✅ บอทกำลังอยู่ในโหมด 'สายลับ' ครับ.";
    pub const RESTRICTED_ON: &str = "✅ เปลี่ยนโหมด: บอทสายลับ ปิดการใช้งานแล้ว";
    pub const RESTRICTED_ALREADY: &str = "✅ บอทกำลังอยู่ในโหมด 'มุ้งมิ้ง ไม่สนโลก' ครับ.";
    pub const AI_DISABLED: &str =
        "❌ ขออภัยครับ ฟังก์ชัน AI ยังไม่พร้อมใช้งาน (ผู้ดูแลยังไม่ได้ตั้งค่า API Key)";
    pub const AI_THINKING: &str = "🧠 กำลังประมวลผลคำถามของคุณด้วย Gemini... กรุณารอสักครู่";
    pub const AI_FAILED: &str =
        "❌ เกิดข้อผิดพลาดในการเรียกใช้ Gemini API กรุณาลองใหม่อีกครั้ง";
    pub const SPEAK_FAILED: &str = "❌ ขออภัยครับ เกิดข้อผิดพลาดในการส่งคำตอบไปอ่าน";

    pub fn usage(prefix: &str, usage: &str) -> String {
        format!("❌ ข้อมูลไม่ครบ โปรดใช้ `{}{}`", prefix, usage)
    }

    pub fn speed_format(prefix: &str) -> String {
        format!(
            "❌ รูปแบบไม่ถูกต้อง, โปรดใช้ตัวเลข เช่น `{}setspeed 1.5`",
            prefix
        )
    }

    pub fn speed_set(speed: f32) -> String {
        format!("✅ ปรับความเร็วการพูดเป็น `{}x` แล้ว", speed)
    }

    pub fn missing_role(role: &str) -> String {
        format!("🚫 คุณไม่มี Role '{}' ที่จำเป็นในการใช้คำสั่งนี้.", role)
    }

    pub fn already_in(channel: &str) -> String {
        format!("บอทอยู่ในช่องเสียง **{}** อยู่แล้วครับ", channel)
    }

    pub fn moved(channel: &str) -> String {
        format!("ย้ายไปช่องเสียง: **{}** แล้ว", channel)
    }

    pub fn joined(channel: &str) -> String {
        format!(
            "🔊 เข้าร่วม **{}** แล้ว! จะอ่านข้อความให้อัตโนมัติ",
            channel
        )
    }

    pub fn join_failed(error: &anyhow::Error) -> String {
        format!("ไม่สามารถเข้าร่วมช่องเสียงได้: {:#}", error)
    }

    pub fn not_ready(prefix: &str) -> String {
        format!(
            "🔊 ผมต้องอยู่ในช่องเสียงและระบบอ่านข้อความต้องพร้อมใช้งานก่อนครับ! กรุณาสั่ง `{}เข้ามา` ก่อน",
            prefix
        )
    }

    pub fn ai_answer(question: &str, answer: &str) -> String {
        format!(
            "**คำถาม:** {}\n**คำตอบจาก Gemini:**\n{}",
            question, answer
        )
    }

    pub fn scripted_answer(answer: &str) -> String {
        format!("คำตอบ: {}", answer)
    }

    pub fn read_mode(mode: ReadMode, prefix: &str) -> String {
        let detail = match mode {
            ReadMode::All => "**อ่านจากทุกช่องแชทใน Guild**".to_string(),
            ReadMode::Restricted {
                designated: Some(channel),
            } => format!(
                "**อ่านเฉพาะจากช่องแชทที่กำหนด** (ช่องที่กำหนด: <#{}>)",
                channel
            ),
            ReadMode::Restricted { designated: None } => format!(
                "**อ่านเฉพาะจากช่องแชทที่กำหนด** (ช่องที่กำหนด: ยังไม่ได้ตั้งค่า โปรดใช้ `{}เข้ามา` ในช่องที่ต้องการ)",
                prefix
            ),
        };
        format!("ℹ️ สถานะการอ่านข้อความใน Guild นี้: {}", detail)
    }
}
