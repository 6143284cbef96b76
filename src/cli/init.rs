//! `counsel init` — write a starter policy file.

use crate::policy::defaults;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::PathBuf;

pub fn run_init(template: &str, output_path: Option<&str>, force: bool) -> Result<()> {
    let output_file = match output_path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir()
            .context("Failed to get current directory")?
            .join(".counsel.yaml"),
    };

    if output_file.exists() && !force {
        println!(
            "{} A policy file already exists at {}",
            "⚠".yellow(),
            output_file.display()
        );
        println!("  Use --force to overwrite it, or edit it directly.");
        return Ok(());
    }

    let yaml_content = defaults::get_default_policy(template).ok_or_else(|| {
        let available: Vec<String> = defaults::available_templates()
            .iter()
            .map(|(name, desc)| format!("  {}: {}", name.bold(), desc))
            .collect();
        anyhow::anyhow!(
            "Unknown template '{}'. Available templates:\n{}",
            template,
            available.join("\n")
        )
    })?;

    std::fs::write(&output_file, yaml_content)
        .with_context(|| format!("Failed to write policy file: {}", output_file.display()))?;

    println!();
    println!(
        "  {} Created {}",
        "✓".green().bold(),
        output_file.display().to_string().bold()
    );
    println!("  Template: {}", template.cyan());
    println!();
    println!("  {} What this policy does:", "ℹ".blue());
    match template {
        "due-diligence" => {
            println!("    • Lets the agent list the data room, read its own files and update todos");
            println!("    • Asks you before it opens documents or pages");
            println!("    • Asks you before it writes or edits files");
            println!("    • Asks you before web research or subagent delegation");
        }
        "strict" => {
            println!("    • Every tool call needs your approval (approve or reject only)");
            println!("    • Unanswered requests are rejected after 5 minutes");
        }
        "observe" => {
            println!("    • Nothing is gated; every call is still written to the audit log");
        }
        _ => {}
    }
    println!();
    println!("  {} Next steps:", "→".blue());
    println!(
        "    1. Check the policy: {}",
        format!("counsel check {}", output_file.display()).dimmed()
    );
    println!(
        "    2. Run a plan: {}",
        "counsel run --data-room room.json --plan plan.json".dimmed()
    );
    println!("    3. Review it: {}", "counsel review --session <id>".dimmed());
    println!();
    Ok(())
}
