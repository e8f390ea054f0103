//! Message protocol definitions
//!
//! Plain-text line protocol: inbound lines parse into `ClientMessage`,
//! outbound lines are queued as `ServerMessage`.

use std::fmt::Display;

use chrono::{DateTime, Datelike, TimeZone};

use crate::error::AppError;

const NICK_USAGE: &str = "/nick <name> [password]";
const REGISTER_USAGE: &str = "/register <name> <password>";

/// Client → Server message
///
/// One framed line, classified. Empty lines never produce a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Plain chat line, relayed verbatim
    Chat(String),
    /// `/time`
    Time,
    /// `/up <text>`
    Up(String),
    /// `/down <text>`
    Down(String),
    /// `/exit`
    Exit,
    /// `/nick <name>`: anonymous rename
    Nick { name: String },
    /// `/nick <name> <password>`: take a registered identity
    Login { name: String, password: String },
    /// `/register <name> <password>`
    Register { name: String, password: String },
    /// Any other slash command
    Unknown(String),
}

impl ClientMessage {
    /// Classify a line (without its newline)
    ///
    /// Returns `Ok(None)` for an empty line and an error when a known
    /// command has the wrong number of arguments or an empty one.
    pub fn parse(line: &str) -> Result<Option<Self>, AppError> {
        if line.is_empty() {
            return Ok(None);
        }

        let Some(command) = line.strip_prefix('/') else {
            return Ok(Some(ClientMessage::Chat(line.to_string())));
        };

        let mut parts = command.split(' ');
        let name = parts.next().unwrap_or_default().to_lowercase();
        let args: Vec<&str> = parts.collect();

        let msg = match name.as_str() {
            "time" => ClientMessage::Time,
            "up" => ClientMessage::Up(args.join(" ")),
            "down" => ClientMessage::Down(args.join(" ")),
            "exit" => ClientMessage::Exit,
            "nick" => match args.as_slice() {
                [name] if !name.is_empty() => ClientMessage::Nick {
                    name: name.to_string(),
                },
                [name, password] if !name.is_empty() && !password.is_empty() => {
                    ClientMessage::Login {
                        name: name.to_string(),
                        password: password.to_string(),
                    }
                }
                _ => return Err(AppError::Usage(NICK_USAGE)),
            },
            "register" => match args.as_slice() {
                [name, password] if !name.is_empty() && !password.is_empty() => {
                    ClientMessage::Register {
                        name: name.to_string(),
                        password: password.to_string(),
                    }
                }
                _ => return Err(AppError::Usage(REGISTER_USAGE)),
            },
            _ => ClientMessage::Unknown(name),
        };

        Ok(Some(msg))
    }
}

/// Server → Client message: one line, written without its newline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage(String);

impl ServerMessage {
    pub fn line(text: impl Into<String>) -> Self {
        ServerMessage(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        if err.is_user_facing() {
            ServerMessage(err.to_string())
        } else {
            // Internal failures are logged by the caller, not detailed to clients
            ServerMessage::line("Internal error")
        }
    }
}

/// Render a `/time` reply, e.g. `Monday 19th of October 2026 03:04:05 PM`
pub fn format_timestamp<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let day = at.day();
    format!(
        "{} {}{} of {}",
        at.format("%A"),
        day,
        ordinal_suffix(day),
        at.format("%B %Y %I:%M:%S %p")
    )
}

fn ordinal_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}
