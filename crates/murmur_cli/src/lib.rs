pub mod bot;
pub mod commands;
pub mod console;
#[cfg(feature = "discord")]
pub mod discord;
pub mod services;

pub use bot::{Bot, Responder, VoiceChannel, VoiceConnector};
pub use commands::{Command, CommandError};
pub use services::Services;
