//! Line-oriented TCP Chat Server - Entry Point
//!
//! Binds the TCP listener and hands it to the chat server.

use std::env;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::{serve, Argon2Credentials, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    // Bind address from the first command line argument, or the default
    let config = Arc::new(ServerConfig::from_args(env::args()));

    // Start TCP listener
    let listener = TcpListener::bind(&config.addr).await?;
    info!("Chat server listening on {}", listener.local_addr()?);

    serve(listener, config, Arc::new(Argon2Credentials::new())).await;

    Ok(())
}
