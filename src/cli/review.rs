//! `counsel review` — attach to a running session and decide its requests.

use crate::client::{AutoApprove, AutoReject, DecisionClient, Phase, Reviewer, TerminalReviewer, Update};
use crate::gateway::protocol::AgentStatus;
use crate::gateway::{GatewayClient, GatewayConnection};
use anyhow::{bail, Result};
use colored::Colorize;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoMode {
    Approve,
    Reject,
}

impl std::str::FromStr for AutoMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" | "approve-all" => Ok(AutoMode::Approve),
            "reject" | "reject-all" | "deny" => Ok(AutoMode::Reject),
            other => Err(format!("unknown auto mode '{}' (use approve or reject)", other)),
        }
    }
}

/// Consecutive local refusals before giving up on a reviewer.
const MAX_REFUSALS: usize = 5;

pub async fn run_review(session_id: &str, socket: Option<PathBuf>, auto: Option<AutoMode>) -> Result<()> {
    let client = match socket {
        Some(path) => GatewayClient::new(path),
        None => GatewayClient::from_env()?,
    };
    let reviewer: Box<dyn Reviewer> = match auto {
        Some(AutoMode::Approve) => Box::new(AutoApprove),
        Some(AutoMode::Reject) => Box::new(AutoReject::default()),
        None => Box::new(TerminalReviewer::new()),
    };

    let mut connection = client.attach(session_id).await?;
    let mut state = DecisionClient::new(session_id);
    println!();
    println!("  {} Reviewing session {}", "⚖".to_string().bold(), session_id.cyan());

    review_loop(&mut connection, &mut state, reviewer.as_ref()).await?;

    println!();
    match state.phase() {
        Phase::Finished(status) => println!(
            "  {} Agent {}{}",
            if status == AgentStatus::Completed { "✓".green() } else { "✗".red() },
            status,
            state
                .status_details()
                .map(|d| format!(": {}", d))
                .unwrap_or_default()
        ),
        _ => println!("  {} Connection closed by counsel", "ℹ".blue()),
    }
    println!();
    Ok(())
}

/// Receive, fold into state, decide whatever is presented, repeat.
pub async fn review_loop(
    connection: &mut GatewayConnection,
    state: &mut DecisionClient,
    reviewer: &dyn Reviewer,
) -> Result<()> {
    while let Some(message) = connection.recv().await? {
        report(&state.handle(message));

        let mut refusals = 0;
        while let Some(request) = state.presented().cloned() {
            let decision = reviewer.review(&request, state.highlights()).await?;
            match state.submit(decision) {
                Ok(envelope) => {
                    connection.send(&envelope).await?;
                    refusals = 0;
                }
                Err(e) => {
                    println!("  {} {}", "✗".red(), e);
                    refusals += 1;
                    if refusals >= MAX_REFUSALS {
                        bail!("Reviewer kept submitting invalid decisions for {}", request.request_id);
                    }
                }
            }
        }

        if state.is_finished() {
            break;
        }
    }
    Ok(())
}

fn report(update: &Update) {
    match update {
        Update::Status(status) => tracing::info!(%status, "Agent status"),
        Update::Queued(id) => println!("  {} Request {} queued", "…".dimmed(), id),
        Update::Workflow(event) if event.event_type == "agent_message" => {
            if let Some(text) = event.data.get("text").and_then(|t| t.as_str()) {
                println!("  {} {}", "agent:".dimmed(), text);
            }
        }
        Update::Error(report) => println!("  {} {}", "⚠".yellow(), report.message),
        _ => {}
    }
}
