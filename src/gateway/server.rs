//! Gateway server — where the reviewer talks to running sessions.
//!
//! Listens on a Unix domain socket. Each connection:
//! 1. Sends `attach` naming a session as its first line
//! 2. Receives a greeting plus every request still pending (replay)
//! 3. Streams decisions back; each goes through the session's broker
//!
//! Dropping the connection only detaches. Pending requests stay pending
//! until a reviewer reattaches or the session is ended.

use crate::gateway::protocol::{encode_line, AgentStatus, ClientMessage, ServerMessage};
use crate::gateway::session::{Session, SessionRegistry};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;

pub const END_SESSION_REASON: &str = "Session ended by reviewer";

pub struct GatewayServer {
    socket_path: PathBuf,
    registry: Arc<SessionRegistry>,
}

impl GatewayServer {
    pub fn new(socket_path: impl AsRef<Path>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
            registry,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Bind the socket, replacing a stale one if present.
    pub fn bind(&self) -> Result<UnixListener> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        let listener = UnixListener::bind(&self.socket_path)
            .with_context(|| format!("Failed to bind socket: {}", self.socket_path.display()))?;
        tracing::info!("Gateway listening on {}", self.socket_path.display());
        Ok(listener)
    }

    /// Accept connections forever.
    pub async fn serve(&self, listener: UnixListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let registry = self.registry.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, registry).await {
                            tracing::error!("Connection handler error: {:#}", e);
                        }
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    pub async fn run(&self) -> Result<()> {
        let listener = self.bind()?;
        self.serve(listener).await
    }
}

async fn write_message(writer: &mut OwnedWriteHalf, message: &ServerMessage) -> Result<()> {
    writer.write_all(encode_line(message)?.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Handle one reviewer connection.
async fn handle_connection(stream: UnixStream, registry: Arc<SessionRegistry>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let Some(first) = lines.next_line().await? else {
        return Ok(());
    };
    let session = match serde_json::from_str::<ClientMessage>(first.trim()) {
        Ok(ClientMessage::Attach { session_id }) => match registry.get(&session_id).await {
            Some(session) => session,
            None => {
                let msg = ServerMessage::protocol_error(None, format!("Unknown session '{}'", session_id));
                return write_message(&mut writer, &msg).await;
            }
        },
        Ok(_) => {
            let msg = ServerMessage::protocol_error(None, "First message must be attach");
            return write_message(&mut writer, &msg).await;
        }
        Err(e) => {
            let msg = ServerMessage::protocol_error(None, format!("Invalid message JSON: {}", e));
            return write_message(&mut writer, &msg).await;
        }
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let greeting = ServerMessage::status(
        AgentStatus::Connected,
        Some(format!("Attached to session {}", session.id)),
    );
    let generation = session.attach(tx.clone(), greeting).await;
    tracing::info!(session = %session.id, generation, "Reviewer attached");

    let writer_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = write_message(&mut writer, &message).await {
                tracing::debug!("Reviewer write failed: {:#}", e);
                break;
            }
        }
    });

    let result = read_decisions(&mut lines, &session, &registry, &tx).await;

    session.channel.detach(generation).await;
    drop(tx);
    // The writer ends once every sender for this connection is gone
    let _ = writer_task.await;
    session.channel.finished(generation).await;

    let remaining = session.broker.pending_count().await;
    tracing::info!(session = %session.id, remaining, "Reviewer detached");
    result
}

async fn read_decisions(
    lines: &mut tokio::io::Lines<BufReader<tokio::net::unix::OwnedReadHalf>>,
    session: &Session,
    registry: &SessionRegistry,
    replies: &mpsc::UnboundedSender<ServerMessage>,
) -> Result<()> {
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message: ClientMessage = match serde_json::from_str(line.trim()) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("Invalid message from reviewer: {}", e);
                let _ = replies.send(ServerMessage::protocol_error(
                    None,
                    format!("Invalid message JSON: {}", e),
                ));
                continue;
            }
        };

        match message {
            ClientMessage::ApprovalDecision {
                request_id,
                decision,
            } => {
                if let Err(violation) = session.broker.resolve(request_id, decision).await {
                    let _ = replies.send(ServerMessage::protocol_error(
                        Some(violation.request_id()),
                        violation.to_string(),
                    ));
                }
            }
            ClientMessage::EndSession => {
                let cancelled = registry.end(&session.id, END_SESSION_REASON).await.unwrap_or(0);
                tracing::info!(session = %session.id, cancelled, "Session ended by reviewer");
                return Ok(());
            }
            ClientMessage::Attach { .. } => {
                let _ = replies.send(ServerMessage::protocol_error(
                    None,
                    "Connection is already attached",
                ));
            }
        }
    }
    Ok(())
}
