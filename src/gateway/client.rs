//! Gateway client — the reviewer's end of the Unix socket.
//!
//! Used by `counsel review` and by the integration tests.

use crate::approval::types::Decision;
use crate::gateway::protocol::{encode_line, ClientMessage, ServerMessage};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use uuid::Uuid;

pub const SOCKET_ENV: &str = "COUNSEL_SOCKET";

pub struct GatewayClient {
    socket_path: PathBuf,
}

impl GatewayClient {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            socket_path: socket_path.as_ref().to_path_buf(),
        }
    }

    /// Create a client using the COUNSEL_SOCKET environment variable.
    pub fn from_env() -> Result<Self> {
        let socket_path = std::env::var(SOCKET_ENV).with_context(|| {
            format!("{} environment variable not set. Is `counsel run` running?", SOCKET_ENV)
        })?;
        Ok(Self::new(socket_path))
    }

    /// Connect and attach to a session.
    pub async fn attach(&self, session_id: &str) -> Result<GatewayConnection> {
        let stream = UnixStream::connect(&self.socket_path).await.with_context(|| {
            format!(
                "Failed to connect to counsel gateway at {}. Is counsel running?",
                self.socket_path.display()
            )
        })?;
        let (reader, writer) = stream.into_split();
        let mut connection = GatewayConnection {
            lines: BufReader::new(reader).lines(),
            writer,
        };
        connection
            .send(&ClientMessage::Attach {
                session_id: session_id.to_string(),
            })
            .await?;
        Ok(connection)
    }
}

/// An attached reviewer connection.
pub struct GatewayConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl GatewayConnection {
    pub async fn send(&mut self, message: &ClientMessage) -> Result<()> {
        self.writer.write_all(encode_line(message)?.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next message from the server. `None` once the server hangs up.
    pub async fn recv(&mut self) -> Result<Option<ServerMessage>> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(None);
            };
            if line.trim().is_empty() {
                continue;
            }
            let message = serde_json::from_str(line.trim())
                .with_context(|| format!("Failed to parse gateway message: {}", line))?;
            return Ok(Some(message));
        }
    }

    pub async fn decide(&mut self, request_id: Uuid, decision: Decision) -> Result<()> {
        self.send(&ClientMessage::ApprovalDecision {
            request_id,
            decision,
        })
        .await
    }

    pub async fn end_session(&mut self) -> Result<()> {
        self.send(&ClientMessage::EndSession).await
    }
}
