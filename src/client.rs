//! Client record definition
//!
//! Represents a connected client with its identity and outbound channel.

use tokio::sync::mpsc;

use crate::message::ServerMessage;
use crate::types::ConnId;

/// Connected client information
///
/// Holds the connection identifier, the current display name, the
/// credential digest of a registered identity and the channel feeding
/// the connection's writer task.
#[derive(Debug)]
pub struct ClientRecord {
    /// Registry key
    pub id: ConnId,
    /// Display name (the connection identifier until renamed)
    pub name: String,
    /// Argon2 PHC digest, present once registered or logged in
    pub credential: Option<String>,
    /// Server → Client line channel
    pub sender: mpsc::Sender<ServerMessage>,
}

impl ClientRecord {
    /// Create a new anonymous client named after its connection
    pub fn new(id: ConnId, sender: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            name: id.to_string(),
            id,
            credential: None,
            sender,
        }
    }

    pub fn display_name(&self) -> &str {
        &self.name
    }

    /// Whether this client holds a password-protected identity
    pub fn is_registered(&self) -> bool {
        self.credential.is_some()
    }

    /// Rename anonymously; a credential tied to the old name is dropped
    pub fn set_name(&mut self, name: String) {
        if self.name != name {
            self.credential = None;
        }
        self.name = name;
    }

    /// Take a password-protected identity
    pub fn set_identity(&mut self, name: String, digest: String) {
        self.name = name;
        self.credential = Some(digest);
    }
}
