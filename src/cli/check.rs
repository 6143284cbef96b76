//! `counsel check` — parse, compile and lint a policy file.

use crate::policy::{linter, parser, PolicySet};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

pub fn run_check(policy_path: &Path) -> Result<()> {
    let policy = parser::parse_policy_file(policy_path)?;
    let set = PolicySet::new(policy.clone())
        .context("Policy parsed but has invalid tool patterns")?;

    println!();
    println!("  {} Policy is valid!", "✓".green().bold());
    println!("  Law:   {}", set.policy_name().cyan());
    println!("  Rules: {}", policy.rules.len());
    match policy.settings.decision_timeout_secs {
        Some(secs) => println!("  Timeout: {}s", secs),
        None => println!("  Timeout: {}", "none".dimmed()),
    }
    println!();
    for (i, rule) in policy.rules.iter().enumerate() {
        println!("  {}. {}", i + 1, rule.describe());
    }

    let warnings = linter::lint_policy(&policy);
    println!();
    if warnings.is_empty() {
        println!("  {} No issues found.", "✓".green());
    } else {
        println!(
            "  {} {} {}:",
            "─".repeat(20).dimmed(),
            warnings.len(),
            if warnings.len() == 1 { "suggestion" } else { "suggestions" }
        );
        println!();
        for warning in &warnings {
            println!("{}", warning.display());
        }
    }
    println!();
    Ok(())
}
