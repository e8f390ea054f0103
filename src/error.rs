//! Error types for the chat server
//!
//! Defines application-level errors and outbound send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;

use crate::types::ConnId;

/// Application-level errors
///
/// Covers both fatal errors (connection teardown) and
/// protocol errors (reported to the sender as a single line).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Inbound line exceeded the configured maximum (fatal for the connection)
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Channel send error (fatal - chat server actor is gone)
    #[error("Channel send error")]
    ChannelSend,

    /// Password hashing or verification could not run
    #[error("Credential error: {0}")]
    Credential(String),

    /// Connection identifier already registered
    #[error("Connection {0} is already registered")]
    AlreadyConnected(ConnId),

    /// Display name does not match the naming rules
    #[error(
        "Username must only contain letters, digits, hyphens and periods \
         and its length must be between 3 and 15 characters."
    )]
    InvalidName,

    /// Wrong number of command arguments
    #[error("Usage: {0}")]
    Usage(&'static str),

    /// No registered identity with this name
    #[error("Name '{0}' is not registered")]
    NotRegistered(String),

    /// Password did not match the registered identity
    #[error("Wrong password for '{0}'")]
    WrongCredential(String),

    /// Name is already in use
    #[error("Name '{0}' is already taken")]
    NameTaken(String),

    /// Slash command not in the command table
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
}

impl AppError {
    /// Whether this error is meant to be shown to the client that caused it
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            AppError::InvalidName
                | AppError::Usage(_)
                | AppError::NotRegistered(_)
                | AppError::WrongCredential(_)
                | AppError::NameTaken(_)
                | AppError::UnknownCommand(_)
        )
    }
}

/// Outbound send errors
///
/// Occurs when queueing a line for a client whose writer cannot take it.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The client is not draining its queue fast enough
    #[error("Channel full")]
    ChannelFull,
}

impl<T> From<TrySendError<T>> for SendError {
    fn from(err: TrySendError<T>) -> Self {
        match err {
            TrySendError::Full(_) => SendError::ChannelFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        }
    }
}
