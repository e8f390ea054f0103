//! TCP connection handler
//!
//! Handles individual client connections: line framing, command dispatch,
//! password work off the actor, and the join/leave/close lifecycle with
//! the ChatServer. Also hosts the accept loop.

use std::sync::Arc;

use chrono::Local;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};

use crate::codec::LineCodec;
use crate::config::ServerConfig;
use crate::credential::Credentials;
use crate::error::AppError;
use crate::message::{format_timestamp, ClientMessage, ServerMessage};
use crate::server::{ChatServer, Reply, ServerCommand};
use crate::types::ConnId;

/// Everything a connection handler shares with the rest of the server
#[derive(Clone)]
pub struct ConnectionContext {
    /// ChatServer command channel
    pub cmd_tx: mpsc::Sender<ServerCommand>,
    /// Password hashing capability
    pub credentials: Arc<dyn Credentials>,
    pub config: Arc<ServerConfig>,
}

/// Run the chat server on an already bound listener
///
/// Spawns the ChatServer actor and one handler task per accepted
/// connection. Accept errors are logged and never stop the loop.
pub async fn serve(
    listener: TcpListener,
    config: Arc<ServerConfig>,
    credentials: Arc<dyn Credentials>,
) {
    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    tokio::spawn(ChatServer::new(cmd_rx).run());
    info!("ChatServer actor started");

    let ctx = ConnectionContext {
        cmd_tx,
        credentials,
        config,
    };

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let ctx = ctx.clone();

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ConnId::from(addr), ctx).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Reply to `/exit`
pub const FAREWELL: &str = "Bye.";

/// Why the read side of a connection stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadEnd {
    /// The client closed its side of the stream
    Eof,
    /// The client sent `/exit`; anything after it is ignored
    Exit,
}

/// Handle one client connection until it closes
///
/// Registers with the ChatServer and dispatches every framed line in
/// arrival order, one at a time. Once either side ends, the client leaves
/// the ChatServer first, then whatever was already queued for it is
/// written out (followed by the farewell after `/exit`) within the drain
/// timeout, and the write half is shut down.
pub async fn handle_connection<S>(
    stream: S,
    conn_id: ConnId,
    ctx: ConnectionContext,
) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut lines = FramedRead::new(reader, LineCodec::new(ctx.config.max_line_length));
    let sink = FramedWrite::new(writer, LineCodec::new(ctx.config.max_line_length));

    // Create channel for server -> client lines
    let (msg_tx, msg_rx) = mpsc::channel::<ServerMessage>(ctx.config.client_buffer);
    let outbound = msg_tx.clone();

    // Register with ChatServer
    if ctx
        .cmd_tx
        .send(ServerCommand::Connect {
            conn_id: conn_id.clone(),
            sender: msg_tx,
        })
        .await
        .is_err()
    {
        error!("Failed to register client {} - server closed", conn_id);
        return Err(AppError::ChannelSend);
    }

    // Spawn write task (ServerMessage -> socket)
    let mut write_task = tokio::spawn(write_lines(sink, msg_rx, conn_id.clone()));

    // Read loop runs here; whichever side finishes first ends the connection
    let read_end = tokio::select! {
        result = read_lines(&mut lines, &outbound, &conn_id, &ctx) => {
            match result {
                Ok(ReadEnd::Exit) => debug!("Client {} asked to leave", conn_id),
                Ok(ReadEnd::Eof) => debug!("Client {} closed the stream", conn_id),
                Err(ref e) => warn!("Read error for {}: {}", conn_id, e),
            }
            Some(result.unwrap_or(ReadEnd::Eof))
        }
        written = &mut write_task => {
            debug!("Write side closed for {}", conn_id);
            if let Ok(Some(mut sink)) = written {
                let _ = sink.close().await;
            }
            None
        }
    };
    drop(outbound);

    // Leaving drops the ChatServer's sender, so the writer runs dry
    let _ = ctx
        .cmd_tx
        .send(ServerCommand::Disconnect {
            conn_id: conn_id.clone(),
        })
        .await;

    if let Some(read_end) = read_end {
        let flush = async {
            if let Ok(Some(mut sink)) = (&mut write_task).await {
                if read_end == ReadEnd::Exit {
                    let _ = sink.send(FAREWELL.to_string()).await;
                }
                // Flush and shut down the write half
                let _ = sink.close().await;
            }
        };
        if tokio::time::timeout(ctx.config.drain_timeout, flush)
            .await
            .is_err()
        {
            warn!("Client {} is not reading, dropping unsent lines", conn_id);
            write_task.abort();
        }
    }

    info!("Client {} disconnected", conn_id);

    Ok(())
}

/// Write queued lines until every sender is gone
///
/// Hands the sink back once the queue is drained, or `None` if a write
/// failed.
async fn write_lines<W>(
    mut sink: FramedWrite<W, LineCodec>,
    mut msg_rx: mpsc::Receiver<ServerMessage>,
    conn_id: ConnId,
) -> Option<FramedWrite<W, LineCodec>>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = msg_rx.recv().await {
        if let Err(e) = sink.send(msg.into_string()).await {
            debug!("Write to {} failed: {}", conn_id, e);
            return None;
        }
    }
    debug!("Write queue drained for {}", conn_id);
    Some(sink)
}

/// Dispatch framed lines until end of stream or `/exit`
///
/// Each line's replies are queued before the next line is read, so a
/// client that stops reading stalls only its own connection.
async fn read_lines<R>(
    lines: &mut FramedRead<R, LineCodec>,
    outbound: &mpsc::Sender<ServerMessage>,
    conn_id: &ConnId,
    ctx: &ConnectionContext,
) -> Result<ReadEnd, AppError>
where
    R: AsyncRead + Unpin,
{
    while let Some(line) = lines.next().await {
        let line = line?;
        debug!("Line from {}: {:?}", conn_id, line);

        let replies = match ClientMessage::parse(&line) {
            Ok(None) => continue,
            Ok(Some(ClientMessage::Exit)) => return Ok(ReadEnd::Exit),
            Ok(Some(msg)) => dispatch(conn_id, msg, ctx).await?,
            Err(error) => vec![error.into()],
        };

        for msg in replies {
            if outbound.send(msg).await.is_err() {
                debug!("Writer gone, ending read loop for {}", conn_id);
                return Err(AppError::ChannelSend);
            }
        }
    }
    Ok(ReadEnd::Eof)
}

/// Execute one client message and collect the lines owed to the client
///
/// Utility commands are answered here; anything touching shared state
/// goes to the ChatServer. Password hashing and verification run on the
/// blocking pool, so the ChatServer only ever sees digests. Fails only
/// when the ChatServer is gone.
async fn dispatch(
    conn_id: &ConnId,
    msg: ClientMessage,
    ctx: &ConnectionContext,
) -> Result<Vec<ServerMessage>, AppError> {
    let conn_id = conn_id.clone();
    let replies = match msg {
        ClientMessage::Time => vec![ServerMessage::line(format_timestamp(&Local::now()))],
        ClientMessage::Up(text) => vec![ServerMessage::line(text.to_uppercase())],
        ClientMessage::Down(text) => vec![ServerMessage::line(text.to_lowercase())],
        ClientMessage::Unknown(name) => vec![AppError::UnknownCommand(name).into()],
        // Handled by the read loop
        ClientMessage::Exit => Vec::new(),
        ClientMessage::Chat(text) => {
            request(ctx, |reply| ServerCommand::Chat {
                conn_id,
                text,
                reply,
            })
            .await?
        }
        ClientMessage::Nick { name } => {
            request(ctx, |reply| ServerCommand::Nick {
                conn_id,
                name,
                reply,
            })
            .await?
        }
        ClientMessage::Register { name, password } => match hash_password(password, ctx).await {
            Ok(digest) => {
                request(ctx, |reply| ServerCommand::Register {
                    conn_id,
                    name,
                    digest,
                    reply,
                })
                .await?
            }
            Err(error) => rejection(&conn_id, error),
        },
        ClientMessage::Login { name, password } => {
            match verify_login(&name, password, ctx).await {
                Ok(digest) => {
                    request(ctx, |reply| ServerCommand::Login {
                        conn_id,
                        name,
                        digest,
                        reply,
                    })
                    .await?
                }
                // The actor is gone: tear down instead of replying
                Err(AppError::ChannelSend) => return Err(AppError::ChannelSend),
                Err(error) => rejection(&conn_id, error),
            }
        }
    };
    Ok(replies)
}

/// Send a command to the ChatServer and wait for the lines it returns
async fn request<F>(ctx: &ConnectionContext, build: F) -> Result<Vec<ServerMessage>, AppError>
where
    F: FnOnce(Reply) -> ServerCommand,
{
    let (reply_tx, reply_rx) = oneshot::channel();
    ctx.cmd_tx
        .send(build(reply_tx))
        .await
        .map_err(|_| AppError::ChannelSend)?;
    reply_rx.await.map_err(|_| AppError::ChannelSend)
}

fn rejection(conn_id: &ConnId, error: AppError) -> Vec<ServerMessage> {
    if !error.is_user_facing() {
        warn!("Internal error for {}: {}", conn_id, error);
    }
    vec![error.into()]
}

async fn hash_password(password: String, ctx: &ConnectionContext) -> Result<String, AppError> {
    let credentials = Arc::clone(&ctx.credentials);
    tokio::task::spawn_blocking(move || credentials.hash(&password))
        .await
        .map_err(|e| AppError::Credential(e.to_string()))?
}

/// Check a password against the digest registered under `name`
///
/// Returns the verified digest; the ChatServer re-checks that it is
/// still current before applying the login.
async fn verify_login(
    name: &str,
    password: String,
    ctx: &ConnectionContext,
) -> Result<String, AppError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    ctx.cmd_tx
        .send(ServerCommand::LookupCredential {
            name: name.to_string(),
            reply: reply_tx,
        })
        .await
        .map_err(|_| AppError::ChannelSend)?;

    let digest = reply_rx
        .await
        .map_err(|_| AppError::ChannelSend)?
        .ok_or_else(|| AppError::NotRegistered(name.to_string()))?;

    let credentials = Arc::clone(&ctx.credentials);
    let candidate = digest.clone();
    let verified = tokio::task::spawn_blocking(move || credentials.verify(&password, &candidate))
        .await
        .map_err(|e| AppError::Credential(e.to_string()))?;

    if verified {
        Ok(digest)
    } else {
        Err(AppError::WrongCredential(name.to_string()))
    }
}
