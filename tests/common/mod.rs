//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use counsel::agent::{GatedExecutor, Plan, ScriptedAgent};
use counsel::approval::{ApprovalBroker, Collaborators};
use counsel::gateway::protocol::ServerMessage;
use counsel::gateway::{GatewayConnection, GatewayServer, Session, SessionChannel, SessionRegistry};
use counsel::policy::{parser, PolicySet};
use counsel::tools::{DataRoom, DataRoomTools};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub const DATA_ROOM: &str = include_str!("../../demos/data_room.json");
pub const PLAN: &str = include_str!("../../demos/plan.json");
pub const POLICY: &str = include_str!("../../demos/policy.yaml");

/// A session served over a real Unix socket in a temp dir.
pub struct Harness {
    pub dir: TempDir,
    pub socket: PathBuf,
    pub session_id: String,
    pub broker: Arc<ApprovalBroker>,
    pub channel: Arc<SessionChannel>,
    pub registry: Arc<SessionRegistry>,
    pub tools: DataRoomTools,
    server: JoinHandle<()>,
}

impl Harness {
    pub async fn start(policy_yaml: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("counsel.sock");
        let session_id = "harbor".to_string();

        let policy = Arc::new(PolicySet::new(parser::parse_policy_str(policy_yaml).unwrap()).unwrap());
        let tools = DataRoomTools::new(DataRoom::from_json(DATA_ROOM).unwrap());
        let channel = Arc::new(SessionChannel::new());
        let broker = Arc::new(ApprovalBroker::new(
            session_id.clone(),
            policy,
            Collaborators {
                documents: tools.room.clone(),
                files: tools.workspace.clone(),
                tasks: tools.todos.clone(),
            },
            channel.clone(),
        ));
        let registry = Arc::new(SessionRegistry::new());
        registry.insert(Session::new(broker.clone(), channel.clone())).await;

        let server = GatewayServer::new(&socket, registry.clone());
        let listener = server.bind().unwrap();
        let server = tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });

        Self {
            dir,
            socket,
            session_id,
            broker,
            channel,
            registry,
            tools,
            server,
        }
    }

    pub fn executor(&self) -> GatedExecutor {
        GatedExecutor::new(self.broker.clone(), Arc::new(self.tools.clone()))
    }

    pub fn agent(&self) -> ScriptedAgent {
        ScriptedAgent::new(self.executor(), self.channel.clone())
    }

    pub fn plan() -> Plan {
        Plan::from_json(PLAN).unwrap()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Next message, failing the test instead of hanging.
pub async fn next(conn: &mut GatewayConnection) -> Option<ServerMessage> {
    tokio::time::timeout(Duration::from_secs(5), conn.recv())
        .await
        .expect("timed out waiting for the gateway")
        .unwrap()
}

/// Skip messages until one matches.
pub async fn next_matching<F>(conn: &mut GatewayConnection, mut pred: F) -> ServerMessage
where
    F: FnMut(&ServerMessage) -> bool,
{
    loop {
        match next(conn).await {
            Some(message) if pred(&message) => return message,
            Some(_) => continue,
            None => panic!("gateway hung up before the expected message"),
        }
    }
}

pub async fn next_request(conn: &mut GatewayConnection) -> counsel::approval::ApprovalRequest {
    match next_matching(conn, |m| matches!(m, ServerMessage::ApprovalRequest(_))).await {
        ServerMessage::ApprovalRequest(request) => request,
        _ => unreachable!(),
    }
}

/// Poll until the broker has `count` open requests.
pub async fn wait_for_pending(broker: &ApprovalBroker, count: usize) {
    for _ in 0..200 {
        if broker.pending_count().await == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("broker never reached {} pending request(s)", count);
}
