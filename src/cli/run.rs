//! `counsel run` — run an agent plan behind the approval gate.
//!
//! 1. Parse and compile the policy
//! 2. Load the data room and the plan
//! 3. Register the session and start the gateway (Unix socket)
//! 4. Replay the plan; gated calls wait for a reviewer (`counsel review`)
//! 5. Print the session summary

use crate::agent::{GatedExecutor, Plan, ScriptedAgent, ToolStatus, Transcript};
use crate::approval::{ApprovalBroker, Collaborators};
use crate::audit::AuditLogger;
use crate::gateway::client::SOCKET_ENV;
use crate::gateway::protocol::{AgentStatus, ServerMessage};
use crate::gateway::transport::Transport;
use crate::gateway::{GatewayServer, Session, SessionChannel, SessionRegistry};
use crate::policy::{parser, PolicySet};
use crate::tools::{DataRoom, DataRoomTools};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct RunOptions {
    pub policy_path: PathBuf,
    pub data_room: PathBuf,
    pub plan: PathBuf,
    /// Default: /tmp/counsel-{session}.sock
    pub socket_path: Option<PathBuf>,
    pub session_id: Option<String>,
    /// Overrides the policy's decision_timeout_secs
    pub timeout_secs: Option<u64>,
    /// Hold the plan until a reviewer attaches
    pub wait_for_reviewer: bool,
    /// Write the audit log here instead of ~/.counsel/logs
    pub log_dir: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from(".counsel.yaml"),
            data_room: PathBuf::from("data_room.json"),
            plan: PathBuf::from("plan.json"),
            socket_path: None,
            session_id: None,
            timeout_secs: None,
            wait_for_reviewer: false,
            log_dir: None,
        }
    }
}

const INTERRUPT_REASON: &str = "Session interrupted before a decision was made";

/// How long an attached reviewer gets to receive the final status
const FLUSH_GRACE: Duration = Duration::from_secs(5);

pub async fn run_session(options: RunOptions) -> Result<()> {
    let session_id = options
        .session_id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..8].to_string());

    println!();
    println!("  {} counsel v{}", "⚖".to_string().bold(), env!("CARGO_PKG_VERSION"));
    println!("  Session: {}", session_id.cyan());

    // Step 1: policy
    let mut policy = parser::parse_policy_file(&options.policy_path).with_context(|| {
        format!(
            "No usable policy at {}. Create one with `counsel init`.",
            options.policy_path.display()
        )
    })?;
    if let Some(secs) = options.timeout_secs {
        policy.settings.decision_timeout_secs = (secs > 0).then_some(secs);
    }
    let policy = Arc::new(PolicySet::new(policy)?);
    println!("  Law:     {}", policy.policy_name().cyan());
    println!("  Rules:   {}", policy.policy().rules.len());

    // Step 2: data room and plan
    let room = DataRoom::load(&options.data_room)?;
    let plan = Plan::load(&options.plan)?;
    println!("  Room:    {} ({} documents)", room.name().cyan(), room.len());
    println!("  Plan:    {} steps", plan.steps.len());

    // Step 3: session and gateway
    let tools = DataRoomTools::new(room);
    let channel = Arc::new(SessionChannel::new());
    let broker = Arc::new(ApprovalBroker::new(
        session_id.clone(),
        policy.clone(),
        Collaborators {
            documents: tools.room.clone(),
            files: tools.workspace.clone(),
            tasks: tools.todos.clone(),
        },
        channel.clone(),
    ));
    let registry = Arc::new(SessionRegistry::new());
    registry
        .insert(Session::new(broker.clone(), channel.clone()))
        .await;

    let socket_path = options
        .socket_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("/tmp/counsel-{}.sock", session_id)));
    let gateway = GatewayServer::new(&socket_path, registry.clone());
    let listener = gateway.bind()?;
    let gateway_handle = tokio::spawn(async move {
        if let Err(e) = gateway.serve(listener).await {
            tracing::error!("Gateway error: {:#}", e);
        }
    });

    let logger = match &options.log_dir {
        Some(dir) => AuditLogger::in_dir(dir, &session_id)?,
        None => AuditLogger::new(&session_id)?,
    };
    println!("  Log:     {}", logger.log_path().display().to_string().dimmed());
    println!("  Socket:  {}", socket_path.display().to_string().dimmed());
    println!();
    println!(
        "  {} Attach a reviewer: {}",
        "→".blue(),
        format!(
            "{}={} counsel review --session {}",
            SOCKET_ENV,
            socket_path.display(),
            session_id
        )
        .dimmed()
    );
    println!();

    if options.wait_for_reviewer {
        println!("  {} Waiting for a reviewer to attach...", "…".dimmed());
        channel.wait_attached().await;
    }

    // Step 4: run the plan
    let executor = GatedExecutor::new(broker.clone(), Arc::new(tools)).with_audit(logger);
    let agent = ScriptedAgent::new(executor, channel.clone());

    let outcome = tokio::select! {
        transcript = agent.run(&plan) => Some(transcript),
        _ = tokio::signal::ctrl_c() => None,
    };

    match &outcome {
        Some(transcript) => print_transcript(transcript),
        None => {
            let cancelled = broker.cancel_all(INTERRUPT_REASON).await;
            let _ = channel
                .send(ServerMessage::status(
                    AgentStatus::Failed,
                    Some(INTERRUPT_REASON.to_string()),
                ))
                .await;
            println!();
            println!(
                "  {} Interrupted ({} pending approval(s) cancelled)",
                "⚠".yellow(),
                cancelled
            );
        }
    }

    // Hand the final status to an attached reviewer before the socket goes
    if !channel.close(FLUSH_GRACE).await {
        tracing::debug!(session = %session_id, "Reviewer still connected at shutdown");
    }
    registry.remove(&session_id, INTERRUPT_REASON).await;
    gateway_handle.abort();
    if socket_path.exists() {
        let _ = std::fs::remove_file(&socket_path);
    }

    println!(
        "  View full log: {}",
        format!("counsel log --session {}", session_id).dimmed()
    );
    println!();
    Ok(())
}

fn print_transcript(transcript: &Transcript) {
    println!("  {} Plan complete", "─".repeat(40).dimmed());
    println!();
    for result in transcript.results() {
        let status = match result.status {
            ToolStatus::Success => "✓".green(),
            ToolStatus::Denied => "✗".red(),
            ToolStatus::Error => "!".yellow(),
        };
        println!("  {} {}", status, result.tool_name.bold());
        if result.status != ToolStatus::Success {
            println!("    {}", crate::utils::text::preview(&result.content, 160).dimmed());
        }
    }
    println!();
    println!(
        "  {} succeeded | {} denied | {} failed",
        transcript.count(ToolStatus::Success).to_string().green().bold(),
        transcript.count(ToolStatus::Denied).to_string().red().bold(),
        transcript.count(ToolStatus::Error).to_string().yellow().bold(),
    );
    println!();
}
