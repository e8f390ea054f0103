//! Line-oriented TCP Chat Server Library
//!
//! A multi-client chat server speaking newline-delimited text over TCP,
//! built with tokio using the Actor pattern for state management.
//!
//! # Features
//! - Newline framing with partial-read buffering
//! - Chat relay to every connected client
//! - Utility commands: `/time`, `/up`, `/down`, `/exit`
//! - Renaming with `/nick <name>`
//! - Password-protected identities: `/register <name> <password>` and
//!   `/nick <name> <password>`
//! - Join, leave and rename announcements
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the client registry
//! - Each connection has a `handler` task (read loop) and a writer task
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use chat_relay::{serve, Argon2Credentials, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Arc::new(ServerConfig::default());
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     serve(listener, config, Arc::new(Argon2Credentials::new())).await;
//! }
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod credential;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use client::ClientRecord;
pub use codec::LineCodec;
pub use config::ServerConfig;
pub use credential::{Argon2Credentials, Credentials};
pub use error::{AppError, SendError};
pub use handler::{handle_connection, serve, ConnectionContext};
pub use message::{ClientMessage, ServerMessage};
pub use registry::Registry;
pub use server::{ChatServer, ServerCommand};
pub use types::{validate_name, ConnId};
