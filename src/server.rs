//! ChatServer Actor implementation
//!
//! The central actor that owns the client registry, executes state
//! changing commands and broadcasts. Uses the Actor pattern with mpsc
//! channels for message passing; the actor never writes to a socket and
//! never waits on a client.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::error::{AppError, SendError};
use crate::message::ServerMessage;
use crate::registry::Registry;
use crate::types::{validate_name, ConnId};

/// Lines for the requesting client, in the order they must be written
///
/// The handler delivers them itself, so they are never dropped the way a
/// broadcast to a full queue is.
pub type Reply = oneshot::Sender<Vec<ServerMessage>>;

/// Commands sent from connection handlers to the ChatServer actor
#[derive(Debug)]
pub enum ServerCommand {
    /// New client connected
    Connect {
        conn_id: ConnId,
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Client disconnected
    Disconnect { conn_id: ConnId },
    /// Relay a chat line
    Chat {
        conn_id: ConnId,
        text: String,
        reply: Reply,
    },
    /// Anonymous rename
    Nick {
        conn_id: ConnId,
        name: String,
        reply: Reply,
    },
    /// Take a registered identity; `digest` was verified by the handler
    Login {
        conn_id: ConnId,
        name: String,
        digest: String,
        reply: Reply,
    },
    /// Register a new identity with a freshly hashed password
    Register {
        conn_id: ConnId,
        name: String,
        digest: String,
        reply: Reply,
    },
    /// Fetch the digest of a registered name
    LookupCredential {
        name: String,
        reply: oneshot::Sender<Option<String>>,
    },
}

/// The main ChatServer actor
///
/// Owns the registry and processes commands from connection handlers
/// one at a time, which makes every registry operation atomic.
pub struct ChatServer {
    /// All connected clients
    registry: Registry,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>) -> Self {
        Self {
            registry: Registry::new(),
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!("ChatServer started");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect { conn_id, sender } => {
                self.handle_connect(conn_id, sender);
            }
            ServerCommand::Disconnect { conn_id } => {
                self.handle_disconnect(&conn_id);
            }
            ServerCommand::Chat {
                conn_id,
                text,
                reply,
            } => {
                let name = self.registry.resolve_display_name(&conn_id);
                let line = format!("{} says: {}", name, text);
                self.broadcast_except(&line, &conn_id);
                respond(reply, vec![ServerMessage::line(line)]);
            }
            ServerCommand::Nick {
                conn_id,
                name,
                reply,
            } => {
                respond(reply, self.handle_nick(&conn_id, name));
            }
            ServerCommand::Login {
                conn_id,
                name,
                digest,
                reply,
            } => {
                respond(reply, self.handle_login(&conn_id, name, &digest));
            }
            ServerCommand::Register {
                conn_id,
                name,
                digest,
                reply,
            } => {
                respond(reply, self.handle_register(&conn_id, name, digest));
            }
            ServerCommand::LookupCredential { name, reply } => {
                let digest = self.registry.credential_for(&name).map(str::to_owned);
                let _ = reply.send(digest);
            }
        }
    }

    /// Handle new client connection
    fn handle_connect(&mut self, conn_id: ConnId, sender: mpsc::Sender<ServerMessage>) {
        if self.registry.get(&conn_id).is_some() {
            warn!("{}", AppError::AlreadyConnected(conn_id));
            return;
        }

        // Announce to the clients already present, then add the newcomer
        self.broadcast(&format!("{} joined the chat.", conn_id));
        if let Err(e) = self.registry.register(conn_id.clone(), sender) {
            warn!("{}", e);
            return;
        }
        info!("Client {} joined", conn_id);
        debug!("Total clients: {}", self.registry.len());
    }

    /// Handle client disconnection
    fn handle_disconnect(&mut self, conn_id: &ConnId) {
        // Removing an unknown client is a no-op and announces nothing
        let Some(client) = self.registry.remove(conn_id) else {
            return;
        };

        info!("Client {} ({}) left", conn_id, client.display_name());
        self.broadcast(&format!("{} left the chat.", client.display_name()));
        debug!("Total clients: {}", self.registry.len());
    }

    /// Handle anonymous rename
    fn handle_nick(&mut self, conn_id: &ConnId, name: String) -> Vec<ServerMessage> {
        if let Err(e) = validate_name(&name) {
            return vec![e.into()];
        }

        match self.registry.set_name(conn_id, &name) {
            Ok(Some(old)) => {
                info!("Client {} renamed '{}' -> '{}'", conn_id, old, name);
                vec![self.announce_rename(conn_id, &old, &name)]
            }
            Ok(None) => Vec::new(),
            Err(e) => vec![e.into()],
        }
    }

    /// Handle taking over a registered identity
    fn handle_login(
        &mut self,
        conn_id: &ConnId,
        name: String,
        digest: &str,
    ) -> Vec<ServerMessage> {
        match self.registry.claim(conn_id, &name, digest) {
            Ok(old) => {
                info!("Client {} logged in as '{}'", conn_id, name);
                let mut lines = vec![ServerMessage::line(format!(
                    "You are now logged in as {}.",
                    name
                ))];
                if let Some(old) = old {
                    lines.push(self.announce_rename(conn_id, &old, &name));
                }
                lines
            }
            Err(e) => vec![e.into()],
        }
    }

    /// Handle identity registration
    fn handle_register(
        &mut self,
        conn_id: &ConnId,
        name: String,
        digest: String,
    ) -> Vec<ServerMessage> {
        if self.registry.lookup_by_name(&name).is_some() {
            return vec![AppError::NameTaken(name).into()];
        }
        if let Err(e) = validate_name(&name) {
            return vec![e.into()];
        }

        match self.registry.set_credential(conn_id, &name, digest) {
            Ok(()) => {
                info!("Client {} registered '{}'", conn_id, name);
                vec![ServerMessage::line(format!(
                    "You are now registered as {}.",
                    name
                ))]
            }
            Err(e) => vec![e.into()],
        }
    }

    /// Tell everyone else about a rename; returns the renamed client's copy
    fn announce_rename(&self, conn_id: &ConnId, old: &str, new: &str) -> ServerMessage {
        let line = format!("{} is now {}", old, new);
        self.broadcast_except(&line, conn_id);
        ServerMessage::line(line)
    }

    /// Queue a line for every registered client
    ///
    /// Delivery failures are logged and skipped; the failing client is
    /// cleaned up by its own connection handler. Returns how many clients
    /// the line was queued for.
    fn broadcast(&self, text: &str) -> usize {
        self.deliver(text, None)
    }

    /// Queue a line for every registered client but one
    fn broadcast_except(&self, text: &str, skip: &ConnId) -> usize {
        self.deliver(text, Some(skip))
    }

    fn deliver(&self, text: &str, skip: Option<&ConnId>) -> usize {
        let mut delivered = 0;
        for (conn_id, sender) in self.registry.recipients() {
            if skip == Some(&conn_id) {
                continue;
            }
            match sender.try_send(ServerMessage::line(text)).map_err(SendError::from) {
                Ok(()) => delivered += 1,
                Err(SendError::ChannelFull) => {
                    warn!("Outbound queue full for {}, dropping line", conn_id);
                }
                Err(SendError::ChannelClosed) => {
                    debug!("Client {} is closing, skipping", conn_id);
                }
            }
        }
        delivered
    }
}

/// Hand the requesting client its lines; the handler may already be gone
fn respond(reply: Reply, lines: Vec<ServerMessage>) {
    let _ = reply.send(lines);
}
