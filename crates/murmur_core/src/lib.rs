pub mod config;
pub mod policy;
pub mod qa;
pub mod speed;

pub use config::MurmurConfig;
pub use policy::{ReadMode, ReadPolicy};
pub use qa::QaTable;
pub use speed::{SpeedError, SpeedSetting};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                Self(raw)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// A chat server (Discord guild). At most one playback session exists per server.
    ServerId
);
snowflake_id!(
    /// A text or voice channel inside a server.
    ChannelId
);
snowflake_id!(UserId);

/// A chat message as seen by the ingress adapters, normalized from whatever
/// platform delivered it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    /// `None` for direct messages.
    pub server: Option<ServerId>,
    pub server_name: String,
    pub channel: ChannelId,
    pub channel_name: String,
    pub author: UserId,
    pub author_name: String,
    pub author_is_bot: bool,
    /// Role names the author holds in the server. Empty for direct messages.
    #[serde(default)]
    pub author_roles: Vec<String>,
    pub content: String,
    pub timestamp: i64, // Unix timestamp
}

impl IncomingMessage {
    pub fn author_has_role(&self, role: &str) -> bool {
        self.author_roles.iter().any(|r| r == role)
    }

    /// Line written to the chat log for every server message the bot can see.
    pub fn log_line(&self) -> String {
        format!(
            "[{} > #{}] {}: {}",
            self.server_name, self.channel_name, self.author_name, self.content
        )
    }
}
