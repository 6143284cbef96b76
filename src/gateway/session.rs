//! Live review sessions, keyed by session id.

use crate::approval::ApprovalBroker;
use crate::gateway::protocol::ServerMessage;
use crate::gateway::transport::SessionChannel;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// One agent run and the channel its reviewer attaches to.
pub struct Session {
    pub id: String,
    pub broker: Arc<ApprovalBroker>,
    pub channel: Arc<SessionChannel>,
}

impl Session {
    pub fn new(broker: Arc<ApprovalBroker>, channel: Arc<SessionChannel>) -> Self {
        Self {
            id: broker.session_id().to_string(),
            broker,
            channel,
        }
    }

    /// Attach a reviewer connection, queueing `greeting` followed by every
    /// request still waiting on a decision.
    pub async fn attach(
        &self,
        sender: mpsc::UnboundedSender<ServerMessage>,
        greeting: ServerMessage,
    ) -> u64 {
        let broker = self.broker.clone();
        let session_id = self.id.clone();
        self.channel
            .attach_with(sender, async move {
                let pending = broker.pending_requests().await;
                if !pending.is_empty() {
                    tracing::info!(session = %session_id, count = pending.len(), "Replaying pending approvals");
                }
                std::iter::once(greeting)
                    .chain(pending.into_iter().map(ServerMessage::ApprovalRequest))
                    .collect()
            })
            .await
    }
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        session
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Cancel everything the session still has open and close its broker,
    /// so any gated call the agent makes afterwards is denied at once. The
    /// session stays registered so the agent can finish and report its status.
    pub async fn end(&self, session_id: &str, reason: &str) -> Option<usize> {
        let session = self.get(session_id).await?;
        Some(session.broker.cancel_all(reason).await)
    }

    /// Drop the session entirely, cancelling anything still open.
    pub async fn remove(&self, session_id: &str, reason: &str) -> Option<Arc<Session>> {
        let session = self.sessions.write().await.remove(session_id)?;
        session.broker.cancel_all(reason).await;
        Some(session)
    }
}
