//! Terminal reviewer using crossterm.
//!
//! Shows what the agent wants to do and why, with the highlighted documents,
//! pages and files, then takes a single keystroke: approve, edit, reject or
//! view. Edits are typed as JSON and confirmed against a line diff of the
//! original arguments.

use crate::approval::types::{ApprovalRequest, Decision, ToolArgs};
use crate::client::state::parse_edit_args;
use crate::client::{HighlightProjection, Reviewer};
use crate::policy::DecisionKind;
use crate::utils::text::preview;
use anyhow::Result;
use async_trait::async_trait;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal,
};
use similar::{ChangeTag, TextDiff};
use std::io::{BufRead, Write};

const REASONING_PREVIEW: usize = 300;
const ARG_LINES: usize = 12;

pub struct TerminalReviewer;

impl TerminalReviewer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalReviewer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reviewer for TerminalReviewer {
    async fn review(&self, request: &ApprovalRequest, highlights: &HighlightProjection) -> Result<Decision> {
        // crossterm does blocking I/O
        let request = request.clone();
        let lines = render_request(&request, highlights);
        tokio::task::spawn_blocking(move || prompt(&request, &lines)).await?
    }
}

fn pretty_args(args: &ToolArgs) -> String {
    serde_json::to_string_pretty(args).unwrap_or_default()
}

/// The request as plain text lines, ready to print.
pub fn render_request(request: &ApprovalRequest, highlights: &HighlightProjection) -> Vec<String> {
    let mut lines = vec![format!("Tool:      {}", request.tool_name)];
    if let Some(note) = &request.policy_note {
        lines.push(format!("Policy:    {}", note));
    }
    lines.push(format!(
        "Reasoning: {}",
        preview(&request.agent_reasoning, REASONING_PREVIEW)
    ));

    lines.push("Arguments:".to_string());
    let args = pretty_args(&request.tool_args);
    let total = args.lines().count();
    lines.extend(args.lines().take(ARG_LINES).map(|l| format!("  {}", l)));
    if total > ARG_LINES {
        lines.push(format!("  ... ({} more lines, press V)", total - ARG_LINES));
    }

    if !request.document_highlights.is_empty() {
        lines.push("Documents:".to_string());
        for doc in &request.document_highlights {
            lines.push(format!("  {}: {}", doc.doc_id, doc.reason));
            for page in &doc.legally_significant_pages {
                let summary = doc.page_summaries.get(page).map(String::as_str).unwrap_or("");
                lines.push(format!("    p{} (significant) {}", page, preview(summary, 80)));
            }
        }
    }
    for doc_id in highlights.documents() {
        let pages = highlights.pages_of(doc_id);
        if !pages.is_empty() {
            let pages: Vec<String> = pages.iter().map(u32::to_string).collect();
            lines.push(format!("Pages:     {} p{}", doc_id, pages.join(", p")));
        }
    }
    for page in &request.page_highlights {
        lines.push(format!("  context: {}", preview(&page.context, 120)));
    }

    for file in &request.file_highlights {
        let state = if file.file_exists { "existing file" } else { "new file" };
        lines.push(format!("File:      {} {} ({})", file.operation, file.file_path, state));
        if let Some(current) = &file.existing_preview {
            lines.push("  now:".to_string());
            lines.extend(current.lines().take(5).map(|l| format!("  | {}", l)));
            lines.push("  proposed:".to_string());
        }
        lines.extend(file.content_preview.lines().take(5).map(|l| format!("  | {}", l)));
    }

    if !request.related_todos.is_empty() {
        lines.push("Todos:".to_string());
        lines.extend(request.related_todos.iter().map(|t| format!("  • {}", t)));
    }
    if let Some(expires) = request.expires_at {
        lines.push(format!("Expires:   {}", expires.format("%H:%M:%S UTC")));
    }
    lines
}

/// Line diff of two argument sets (pretty-printed JSON), `-`/`+`/` ` prefixed.
pub fn args_diff(original: &ToolArgs, edited: &ToolArgs) -> String {
    let old = pretty_args(original);
    let new = pretty_args(edited);
    let diff = TextDiff::from_lines(&old, &new);
    let mut out = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "-",
            ChangeTag::Insert => "+",
            ChangeTag::Equal => " ",
        };
        out.push_str(sign);
        out.push_str(&change.to_string());
        if change.missing_newline() {
            out.push('\n');
        }
    }
    out
}

fn key_hint(request: &ApprovalRequest) -> Vec<(Color, &'static str)> {
    let mut hints = Vec::new();
    if request.allows(DecisionKind::Approve) {
        hints.push((Color::Green, "[A] Approve  "));
    }
    if request.allows(DecisionKind::Edit) {
        hints.push((Color::Cyan, "[E] Edit  "));
    }
    if request.allows(DecisionKind::Reject) {
        hints.push((Color::Red, "[R] Reject  "));
    }
    hints.push((Color::Blue, "[V] View full arguments"));
    hints
}

fn read_key() -> Result<KeyCode> {
    terminal::enable_raw_mode()?;
    let code = loop {
        match event::read() {
            Ok(Event::Key(KeyEvent {
                code,
                kind: KeyEventKind::Press,
                ..
            })) => break Ok(code),
            Ok(_) => continue,
            Err(e) => break Err(e),
        }
    };
    terminal::disable_raw_mode()?;
    Ok(code?)
}

fn read_line() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Display the request and loop until a permitted decision is made.
fn prompt(request: &ApprovalRequest, lines: &[String]) -> Result<Decision> {
    let mut stdout = std::io::stdout();

    execute!(
        stdout,
        Print("\n"),
        SetForegroundColor(Color::Yellow),
        Print("╔══════════════════════════════════════════════════════════╗\n"),
        Print("║                    APPROVAL REQUIRED                     ║\n"),
        Print("╚══════════════════════════════════════════════════════════╝\n"),
        ResetColor,
    )?;
    for line in lines {
        execute!(stdout, Print(format!("  {}\n", line)))?;
    }

    loop {
        execute!(stdout, Print("\n  "))?;
        for (color, hint) in key_hint(request) {
            execute!(stdout, SetForegroundColor(color), Print(hint))?;
        }
        execute!(stdout, ResetColor, Print("\n"))?;
        stdout.flush()?;

        let allows = |kind| request.allows(kind);
        match read_key()? {
            KeyCode::Char('a') | KeyCode::Char('A') if allows(DecisionKind::Approve) => {
                execute!(stdout, SetForegroundColor(Color::Green), Print("\n  ✓ Approved\n\n"), ResetColor)?;
                return Ok(Decision::Approve);
            }
            KeyCode::Char('e') | KeyCode::Char('E') if allows(DecisionKind::Edit) => {
                if let Some(edited_args) = read_edit(&mut stdout, &request.tool_args)? {
                    execute!(stdout, SetForegroundColor(Color::Cyan), Print("\n  ✎ Edited\n\n"), ResetColor)?;
                    return Ok(Decision::Edit { edited_args });
                }
            }
            KeyCode::Char('r') | KeyCode::Char('R') | KeyCode::Esc if allows(DecisionKind::Reject) => {
                execute!(stdout, Print("  Reason (optional): "))?;
                stdout.flush()?;
                let reason = read_line()?;
                execute!(stdout, SetForegroundColor(Color::Red), Print("\n  ✗ Rejected\n\n"), ResetColor)?;
                return Ok(Decision::reject(reason.trim()));
            }
            KeyCode::Char('v') | KeyCode::Char('V') => {
                execute!(
                    stdout,
                    SetForegroundColor(Color::DarkGrey),
                    Print("\n--- Full arguments ---\n"),
                    Print(pretty_args(&request.tool_args)),
                    Print("\n--- End arguments ---\n"),
                    ResetColor,
                )?;
            }
            _ => continue,
        }
    }
}

/// Read edited JSON until it parses and the reviewer confirms the diff.
/// `None` when the reviewer backs out with an empty entry.
fn read_edit(stdout: &mut std::io::Stdout, original: &ToolArgs) -> Result<Option<ToolArgs>> {
    loop {
        execute!(
            stdout,
            Print("\n  Current arguments:\n"),
            SetForegroundColor(Color::DarkGrey),
            Print(pretty_args(original)),
            ResetColor,
            Print("\n  Enter edited arguments as a JSON object (empty line to cancel):\n"),
        )?;
        stdout.flush()?;

        let mut buffer = String::new();
        loop {
            let line = read_line()?;
            if line.trim().is_empty() {
                break;
            }
            buffer.push_str(&line);
            if parse_edit_args(&buffer).is_ok() {
                break;
            }
        }
        if buffer.trim().is_empty() {
            return Ok(None);
        }

        let edited = match parse_edit_args(&buffer) {
            Ok(args) => args,
            Err(e) => {
                execute!(stdout, SetForegroundColor(Color::Red), Print(format!("  {}\n", e)), ResetColor)?;
                continue;
            }
        };

        execute!(stdout, Print("\n"))?;
        for line in args_diff(original, &edited).lines() {
            let color = match line.chars().next() {
                Some('+') => Color::Green,
                Some('-') => Color::Red,
                _ => Color::DarkGrey,
            };
            execute!(stdout, SetForegroundColor(color), Print(format!("  {}\n", line)), ResetColor)?;
        }
        execute!(stdout, Print("  Send these arguments? [Y/N] "))?;
        stdout.flush()?;
        if matches!(read_key()?, KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter) {
            return Ok(Some(edited));
        }
    }
}
