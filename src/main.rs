//! counsel — human-in-the-loop approval gate for document-review agents.
//!
//! Quick start:
//!   counsel init                                   # write .counsel.yaml
//!   counsel run --data-room room.json --plan plan.json
//!   counsel review --session <id>                  # in another terminal
//!   counsel log                                    # what happened
//!
//! For more info: counsel --help

use clap::{Parser, Subcommand};
use colored::Colorize;
use counsel::cli;
use counsel::cli::review::AutoMode;
use std::path::PathBuf;

/// counsel — a human signs off before the agent acts.
#[derive(Parser)]
#[command(
    name = "counsel",
    version,
    about = "Put a human reviewer between a document-review agent and its tools",
    long_about = "counsel intercepts an agent's tool calls, asks a human reviewer to\n\
                  approve, edit or reject the ones your policy gates, and logs every call.\n\n\
                  Quick start:\n  \
                  counsel init\n  \
                  counsel run --data-room room.json --plan plan.json\n  \
                  counsel review --session <id>"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an agent plan behind the approval gate
    Run {
        #[arg(short, long, default_value = ".counsel.yaml")]
        policy: PathBuf,

        /// Data room fixture (JSON)
        #[arg(long)]
        data_room: PathBuf,

        /// Recorded agent plan (JSON)
        #[arg(long)]
        plan: PathBuf,

        /// Gateway socket path
        #[arg(long, env = "COUNSEL_SOCKET")]
        socket: Option<PathBuf>,

        /// Session ID (default: random)
        #[arg(long)]
        session: Option<String>,

        /// Seconds before an unanswered request is rejected (0 = never)
        #[arg(long)]
        timeout: Option<u64>,

        /// Hold the plan until a reviewer attaches
        #[arg(long)]
        wait: bool,

        /// Write the audit log to this directory
        #[arg(long)]
        log_dir: Option<PathBuf>,
    },

    /// Attach to a session and decide its approval requests
    Review {
        #[arg(short, long)]
        session: String,

        #[arg(long, env = "COUNSEL_SOCKET")]
        socket: Option<PathBuf>,

        /// Decide automatically: approve or reject
        #[arg(long)]
        auto: Option<AutoMode>,
    },

    /// Create a policy file from a template
    Init {
        #[arg(short, long, default_value = "due-diligence")]
        template: String,
        #[arg(short, long)]
        output: Option<String>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate your policy file
    Check {
        #[arg(default_value = ".counsel.yaml")]
        policy: PathBuf,
    },

    /// See what the agent did
    Log {
        #[arg(short, long, help = "Session ID to view")]
        session: Option<String>,

        #[arg(short, long, help = "Filter by tool name")]
        tool: Option<String>,

        #[arg(
            short,
            long,
            help = "Filter: ungated, approved, edited, rejected, expired, cancelled"
        )]
        disposition: Option<String>,

        #[arg(short, long, help = "Max entries to show")]
        limit: Option<usize>,

        #[arg(long, help = "Show only the session summary")]
        summary: bool,

        #[arg(long, help = "List all recorded sessions")]
        list: bool,
    },
}

#[tokio::main]
async fn main() {
    // Quiet by default; RUST_LOG overrides
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("counsel=warn")),
        )
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            policy,
            data_room,
            plan,
            socket,
            session,
            timeout,
            wait,
            log_dir,
        } => {
            let options = cli::run::RunOptions {
                policy_path: policy,
                data_room,
                plan,
                socket_path: socket,
                session_id: session,
                timeout_secs: timeout,
                wait_for_reviewer: wait,
                log_dir,
            };
            cli::run::run_session(options).await
        }

        Commands::Review {
            session,
            socket,
            auto,
        } => cli::review::run_review(&session, socket, auto).await,

        Commands::Init {
            template,
            output,
            force,
        } => cli::init::run_init(&template, output.as_deref(), force),

        Commands::Check { policy } => cli::check::run_check(&policy),

        Commands::Log {
            session,
            tool,
            disposition,
            limit,
            summary,
            list,
        } => {
            if list {
                cli::log::run_log_list()
            } else {
                cli::log::run_log(
                    session.as_deref(),
                    tool.as_deref(),
                    disposition.as_deref(),
                    limit,
                    summary,
                )
            }
        }
    };

    if let Err(e) = result {
        eprintln!();
        eprintln!("  {} {}", "✗".red().bold(), e);
        for cause in e.chain().skip(1) {
            eprintln!("  {} {}", "caused by:".dimmed(), cause);
        }
        eprintln!();
        std::process::exit(1);
    }
}
