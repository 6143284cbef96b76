//! Policy set — decides which tool calls are gated.
//!
//! Rules are evaluated **in order**; first match wins. A tool that no rule
//! names runs ungated. Patterns are pre-compiled at load time, so a lookup
//! is a scan over a handful of glob matchers.

use crate::policy::types::*;
use crate::utils::patterns::ToolMatcher;
use anyhow::{Context, Result};

/// Pre-compiled policy ready for fast lookups.
/// Created once from a Policy, then shared by every session that uses it.
pub struct PolicySet {
    policy: Policy,
    compiled_rules: Vec<CompiledRule>,
}

struct CompiledRule {
    rule: Rule,
    matcher: ToolMatcher,
}

impl PolicySet {
    /// Compile all tool patterns upfront.
    pub fn new(policy: Policy) -> Result<Self> {
        let compiled_rules = policy
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                let matcher = ToolMatcher::new(rule.tools())
                    .with_context(|| format!("Invalid tool pattern in rule {}", i))?;
                Ok(CompiledRule {
                    rule: rule.clone(),
                    matcher,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            policy,
            compiled_rules,
        })
    }

    /// Look up how a tool call should be gated.
    pub fn gate(&self, tool_name: &str) -> Gate {
        let Some(compiled) = self
            .compiled_rules
            .iter()
            .find(|c| c.matcher.matches(tool_name))
        else {
            return Gate::Open { matched_rule: None };
        };

        match &compiled.rule {
            Rule::Allow { .. } => Gate::Open {
                matched_rule: Some(compiled.rule.describe()),
            },
            Rule::RequireApproval {
                decisions, prompt, ..
            } => Gate::Approval {
                allowed_decisions: decisions
                    .clone()
                    .unwrap_or_else(|| ToolKind::of(tool_name).default_decisions()),
                prompt: prompt.clone(),
                matched_rule: compiled.rule.describe(),
            },
        }
    }

    /// Whether a call to this tool must wait for a human.
    pub fn requires_approval(&self, tool_name: &str) -> bool {
        self.gate(tool_name).requires_approval()
    }

    /// Decisions the reviewer may make for this tool. Empty when ungated.
    pub fn allowed_decisions(&self, tool_name: &str) -> Vec<DecisionKind> {
        match self.gate(tool_name) {
            Gate::Approval {
                allowed_decisions, ..
            } => allowed_decisions,
            Gate::Open { .. } => Vec::new(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.policy.settings
    }

    pub fn policy_name(&self) -> &str {
        &self.policy.law
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }
}
