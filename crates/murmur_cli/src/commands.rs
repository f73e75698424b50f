//! Prefix command parsing.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetSpeed(f32),
    Join,
    Leave,
    ReadAll,
    RestrictChannels,
    ReadMode,
    Ai(String),
    Ask(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    /// Not a known command name. Ignored without a reply.
    #[error("unknown command: {0}")]
    Unknown(String),
    #[error("missing argument, usage: {usage}")]
    MissingArgument { usage: &'static str },
    #[error("not a number: {0}")]
    BadNumber(String),
}

/// Every accepted name per command. The first entry is the canonical one.
const NAMES: &[(&[&str], CommandKind)] = &[
    (&["setspeed", "ความเร็ว"], CommandKind::SetSpeed),
    (&["join", "เข้ามา", "มานี่", "ตามมา"], CommandKind::Join),
    (&["leave", "ไปไกลๆ", "หนีไป", "ออกไป"], CommandKind::Leave),
    (&["readall", "เปิดโหมดสายลับ", "enableallchannels"], CommandKind::ReadAll),
    (
        &["restrictchannels", "ปิดโหมดสายลับ", "disableallchannels"],
        CommandKind::RestrictChannels,
    ),
    (&["readmode", "ดูสถานะการอ่าน", "readstatus"], CommandKind::ReadMode),
    (&["ai", "askai", "queryai"], CommandKind::Ai),
    (&["ask", "ถาม", "query"], CommandKind::Ask),
];

#[derive(Debug, Clone, Copy)]
enum CommandKind {
    SetSpeed,
    Join,
    Leave,
    ReadAll,
    RestrictChannels,
    ReadMode,
    Ai,
    Ask,
}

impl Command {
    /// Parse `content` if it starts with `prefix`. `None` means the message is
    /// ordinary chat.
    pub fn parse(prefix: &str, content: &str) -> Option<Result<Command, CommandError>> {
        let body = content.strip_prefix(prefix)?;
        let body = body.trim_start();
        let (name, rest) = match body.find(char::is_whitespace) {
            Some(i) => (&body[..i], body[i..].trim()),
            None => (body, ""),
        };
        Some(Self::from_parts(name, rest))
    }

    fn from_parts(name: &str, rest: &str) -> Result<Command, CommandError> {
        let lowered = name.to_lowercase();
        let kind = NAMES
            .iter()
            .find(|(names, _)| names.contains(&lowered.as_str()))
            .map(|(_, kind)| *kind)
            .ok_or_else(|| CommandError::Unknown(name.to_string()))?;

        let command = match kind {
            CommandKind::SetSpeed => {
                let arg = first_word(rest).ok_or(CommandError::MissingArgument {
                    usage: "setspeed <0.5-2.0>",
                })?;
                let speed = arg
                    .parse::<f32>()
                    .map_err(|_| CommandError::BadNumber(arg.to_string()))?;
                Command::SetSpeed(speed)
            }
            CommandKind::Join => Command::Join,
            CommandKind::Leave => Command::Leave,
            CommandKind::ReadAll => Command::ReadAll,
            CommandKind::RestrictChannels => Command::RestrictChannels,
            CommandKind::ReadMode => Command::ReadMode,
            CommandKind::Ai => Command::Ai(required(rest, "ai <คำถาม>")?),
            CommandKind::Ask => Command::Ask(required(rest, "ask <คำถาม>")?),
        };
        Ok(command)
    }

    /// Commands gated on the server owner role.
    pub fn requires_owner(&self) -> bool {
        matches!(
            self,
            Command::ReadAll | Command::RestrictChannels | Command::ReadMode
        )
    }
}

fn first_word(rest: &str) -> Option<&str> {
    rest.split_whitespace().next()
}

fn required(rest: &str, usage: &'static str) -> Result<String, CommandError> {
    if rest.is_empty() {
        return Err(CommandError::MissingArgument { usage });
    }
    Ok(rest.to_string())
}
