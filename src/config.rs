//! Server configuration
//!
//! Bind address and per-connection limits. The address can be overridden
//! by the first command line argument; everything else uses defaults.

use std::time::Duration;

use crate::codec::DEFAULT_MAX_LINE_LENGTH;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:1337";

/// Channel buffer size for server commands
pub const DEFAULT_COMMAND_BUFFER: usize = 256;

/// Channel buffer size for lines queued to a single client
pub const DEFAULT_CLIENT_BUFFER: usize = 128;

/// How long a closing connection may take to write out queued lines
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration structure
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `host:port` to listen on
    pub addr: String,
    /// Capacity of the ChatServer command queue
    pub command_buffer: usize,
    /// Capacity of each client's outbound queue
    pub client_buffer: usize,
    /// Longest accepted inbound line, in bytes
    pub max_line_length: usize,
    /// Grace period for flushing a closing connection before it is cut
    pub drain_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            command_buffer: DEFAULT_COMMAND_BUFFER,
            client_buffer: DEFAULT_CLIENT_BUFFER,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    /// Build from process arguments (program name first)
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Self::default();
        if let Some(addr) = args.into_iter().nth(1) {
            config.addr = addr;
        }
        config
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_client_buffer(mut self, size: usize) -> Self {
        self.client_buffer = size.max(1);
        self
    }

    pub fn with_max_line_length(mut self, len: usize) -> Self {
        self.max_line_length = len.max(1);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}
