//! Outbound delivery of server messages to whichever reviewer is attached.

use crate::gateway::protocol::ServerMessage;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex, Notify};

/// Anything that can push a message towards the reviewer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fails when nobody is listening. Callers decide whether that matters.
    async fn send(&self, message: ServerMessage) -> Result<()>;
}

#[async_trait]
impl Transport for mpsc::UnboundedSender<ServerMessage> {
    async fn send(&self, message: ServerMessage) -> Result<()> {
        mpsc::UnboundedSender::send(self, message).map_err(|_| anyhow!("receiver dropped"))
    }
}

struct Attachment {
    generation: u64,
    sender: mpsc::UnboundedSender<ServerMessage>,
}

#[derive(Default)]
struct Slot {
    current: Option<Attachment>,
    next_generation: u64,
    /// Closed attachment whose connection hasn't finished writing yet
    draining: Option<(u64, oneshot::Sender<()>)>,
}

/// A session's outbound channel. At most one reviewer connection is attached
/// at a time; a new attach replaces the old one.
#[derive(Default)]
pub struct SessionChannel {
    slot: Mutex<Slot>,
    attached: Notify,
}

impl SessionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a connection. `backlog` runs while the channel is locked and
    /// its messages are queued before anything sent afterwards, so nothing
    /// emitted concurrently can overtake the replay.
    ///
    /// Returns the attachment generation to pass to [`detach`](Self::detach).
    pub async fn attach_with<F>(&self, sender: mpsc::UnboundedSender<ServerMessage>, backlog: F) -> u64
    where
        F: Future<Output = Vec<ServerMessage>> + Send,
    {
        let mut slot = self.slot.lock().await;
        for message in backlog.await {
            let _ = sender.send(message);
        }
        slot.next_generation += 1;
        let generation = slot.next_generation;
        if slot.current.is_some() {
            tracing::info!(generation, "Replacing previously attached reviewer");
        }
        slot.current = Some(Attachment { generation, sender });
        drop(slot);
        self.attached.notify_waiters();
        generation
    }

    pub async fn attach(&self, sender: mpsc::UnboundedSender<ServerMessage>) -> u64 {
        self.attach_with(sender, async { Vec::new() }).await
    }

    /// Detach, but only if `generation` is still the current attachment.
    pub async fn detach(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.current.as_ref().map(|a| a.generation) == Some(generation) {
            slot.current = None;
        }
    }

    pub async fn is_attached(&self) -> bool {
        self.slot
            .lock()
            .await
            .current
            .as_ref()
            .is_some_and(|a| !a.sender.is_closed())
    }

    /// Resolve once a reviewer is attached.
    pub async fn wait_attached(&self) {
        loop {
            let notified = self.attached.notified();
            tokio::pin!(notified);
            // Register before checking so an attach in between isn't missed
            notified.as_mut().enable();
            if self.is_attached().await {
                return;
            }
            notified.await;
        }
    }

    /// Detach the current reviewer and wait up to `grace` for its connection
    /// to write out everything queued. `false` if it didn't finish in time.
    pub async fn close(&self, grace: Duration) -> bool {
        let (done, finished) = oneshot::channel();
        {
            let mut slot = self.slot.lock().await;
            let Some(attachment) = slot.current.take() else {
                return true;
            };
            slot.draining = Some((attachment.generation, done));
        }
        matches!(tokio::time::timeout(grace, finished).await, Ok(Ok(())))
    }

    /// Called by a connection once its writer has flushed and stopped.
    pub async fn finished(&self, generation: u64) {
        let mut slot = self.slot.lock().await;
        if slot.draining.as_ref().map(|(g, _)| *g) == Some(generation) {
            if let Some((_, done)) = slot.draining.take() {
                let _ = done.send(());
            }
        }
    }
}

#[async_trait]
impl Transport for SessionChannel {
    async fn send(&self, message: ServerMessage) -> Result<()> {
        let mut slot = self.slot.lock().await;
        let Some(attachment) = slot.current.as_ref() else {
            return Err(anyhow!("no reviewer attached"));
        };
        if attachment.sender.send(message).is_err() {
            slot.current = None;
            return Err(anyhow!("reviewer connection closed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::protocol::AgentStatus;

    fn running() -> ServerMessage {
        ServerMessage::status(AgentStatus::Running, None)
    }

    #[tokio::test]
    async fn test_send_without_reviewer_fails() {
        let channel = SessionChannel::new();
        assert!(channel.send(running()).await.is_err());
        assert!(!channel.is_attached().await);
    }

    #[tokio::test]
    async fn test_backlog_precedes_live_messages() {
        let channel = SessionChannel::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let backlog = vec![ServerMessage::protocol_error(None, "replayed")];
        channel.attach_with(tx, async move { backlog }).await;
        channel.send(running()).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().kind(), "protocol_error");
        assert_eq!(rx.recv().await.unwrap().kind(), "agent_status");
    }

    #[tokio::test]
    async fn test_stale_detach_keeps_newer_attachment() {
        let channel = SessionChannel::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();
        let old = channel.attach(old_tx).await;
        channel.attach(new_tx).await;

        channel.detach(old).await;
        channel.send(running()).await.unwrap();
        assert!(new_rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_wait_attached_wakes_on_attach() {
        let channel = std::sync::Arc::new(SessionChannel::new());
        let waiter = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.wait_attached().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        let (tx, _rx) = mpsc::unbounded_channel();
        channel.attach(tx).await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("attach should wake the waiter")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_attached_returns_when_already_attached() {
        let channel = SessionChannel::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        channel.attach(tx).await;
        tokio::time::timeout(Duration::from_secs(1), channel.wait_attached())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_close_waits_for_writer_to_drain() {
        let channel = std::sync::Arc::new(SessionChannel::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let generation = channel.attach(tx).await;
        channel.send(running()).await.unwrap();

        let writer = {
            let channel = channel.clone();
            tokio::spawn(async move {
                let mut written = Vec::new();
                while let Some(message) = rx.recv().await {
                    written.push(message.kind());
                }
                channel.finished(generation).await;
                written
            })
        };

        assert!(channel.close(Duration::from_secs(1)).await);
        assert!(!channel.is_attached().await);
        assert_eq!(writer.await.unwrap(), vec!["agent_status"]);
    }

    #[tokio::test]
    async fn test_close_without_reviewer_returns_at_once() {
        let channel = SessionChannel::new();
        assert!(channel.close(Duration::from_secs(60)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_gives_up_after_grace() {
        let channel = SessionChannel::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let held = tx.clone();
        channel.attach(tx).await;
        assert!(!channel.close(Duration::from_secs(2)).await);
        drop(held);
    }

    #[tokio::test]
    async fn test_closed_receiver_detaches() {
        let channel = SessionChannel::new();
        let (tx, rx) = mpsc::unbounded_channel();
        channel.attach(tx).await;
        drop(rx);
        assert!(channel.send(running()).await.is_err());
        assert!(!channel.is_attached().await);
    }
}
