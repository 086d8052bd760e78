//! Acting on a finished assistant reply.
//!
//! Two independent passes run over the reply text:
//!
//! 1. Every non-trivial fenced code block is offered as a new file. The user
//!    picks the path; no path means no file.
//! 2. When agent actions are enabled, `[ACTION: kind: argument]` directives
//!    are carried out in order of appearance. Commands and file creation
//!    are confirmed first; each confirmation completes before the next
//!    directive is considered.

pub mod host;
pub mod prompter;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

use tracing::{info, warn};

use crate::ai::parser::{self, ActionKind, CodeBlock, Directive};
use crate::config::AgentActionSettings;

pub use host::{EditorHost, LocalHost, Prompter};
pub use prompter::{ChannelPrompter, StdioPrompter};

/// What happened to one offered file or directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Executed(String),
    /// The user said no, or gave no path.
    Declined(String),
    /// Not actionable: malformed argument or no active editor.
    Skipped(String),
    Failed(String),
}

impl fmt::Display for ActionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Executed(what) => write!(f, "executed: {what}"),
            Self::Declined(what) => write!(f, "declined: {what}"),
            Self::Skipped(what) => write!(f, "skipped: {what}"),
            Self::Failed(what) => write!(f, "failed: {what}"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActionDispatcher {
    settings: AgentActionSettings,
}

impl ActionDispatcher {
    pub fn new(settings: AgentActionSettings) -> Self {
        Self { settings }
    }

    /// Run both passes over a committed reply.
    pub async fn dispatch<H: EditorHost + ?Sized>(&self, host: &H, reply: &str) -> Vec<ActionOutcome> {
        let mut outcomes = self.offer_code_blocks(host, reply).await;
        if self.settings.enabled {
            outcomes.extend(self.run_directives(host, reply).await);
        }
        for outcome in &outcomes {
            info!(%outcome, "Action");
        }
        outcomes
    }

    pub async fn offer_code_blocks<H: EditorHost + ?Sized>(
        &self,
        host: &H,
        reply: &str,
    ) -> Vec<ActionOutcome> {
        let mut outcomes = Vec::new();
        for block in parser::extract_code_blocks(reply) {
            outcomes.push(offer_block(host, &block).await);
        }
        outcomes
    }

    /// Collect every directive first, then act on them one at a time.
    pub async fn run_directives<H: EditorHost + ?Sized>(
        &self,
        host: &H,
        reply: &str,
    ) -> Vec<ActionOutcome> {
        let directives = parser::parse_directives(reply);
        let mut outcomes = Vec::with_capacity(directives.len());
        for directive in &directives {
            outcomes.push(self.run_directive(host, directive).await);
        }
        outcomes
    }

    async fn run_directive<H: EditorHost + ?Sized>(&self, host: &H, directive: &Directive) -> ActionOutcome {
        match directive.kind {
            ActionKind::RunCommand => {
                let command = directive.argument.as_str();
                let label = format!("run_command {command}");
                if !host.confirm(&format!("Run command: {command}?"), "Run").await {
                    return ActionOutcome::Declined(label);
                }
                match host.run_in_terminal(command).await {
                    Ok(()) => ActionOutcome::Executed(label),
                    Err(e) => fail(host, label, &e).await,
                }
            }
            ActionKind::CreateFile => {
                let Some(args) = directive.create_file_args() else {
                    return ActionOutcome::Skipped(format!("create_file without content: {}", directive.argument));
                };
                let label = format!("create_file {}", args.path);
                let question = format!("Create file {} with content?", args.path);
                if !host.confirm(&question, "Create").await {
                    return ActionOutcome::Declined(label);
                }
                create_and_open(host, &args.path, &args.content, label).await
            }
            ActionKind::InsertAtCursor => {
                let text = directive.argument.trim();
                if text.is_empty() {
                    return ActionOutcome::Skipped("insert_at_cursor with empty text".to_string());
                }
                let label = "insert_at_cursor".to_string();
                if self.settings.confirm_insert_at_cursor
                    && !host.confirm(&format!("Insert at cursor: {text}?"), "Insert").await
                {
                    return ActionOutcome::Declined(label);
                }
                match host.insert_at_cursor(text).await {
                    Ok(true) => ActionOutcome::Executed(label),
                    Ok(false) => ActionOutcome::Skipped("insert_at_cursor without an active editor".to_string()),
                    Err(e) => fail(host, label, &e).await,
                }
            }
        }
    }
}

async fn offer_block<H: EditorHost + ?Sized>(host: &H, block: &CodeBlock) -> ActionOutcome {
    let default = block.default_file_name();
    let prompt = match &block.language {
        Some(language) => format!("Save {language} code block as"),
        None => "Save code block as".to_string(),
    };
    let path = host
        .ask_input(&prompt, Some(&default))
        .await
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());
    match path {
        Some(path) => {
            let label = format!("save code block to {path}");
            create_and_open(host, &path, &block.content, label).await
        }
        None => ActionOutcome::Declined(format!("save {} code block", block.extension)),
    }
}

async fn create_and_open<H: EditorHost + ?Sized>(
    host: &H,
    path: &str,
    content: &str,
    label: String,
) -> ActionOutcome {
    let written = match host.write_file(path, content).await {
        Ok(written) => written,
        Err(e) => return fail(host, label, &e).await,
    };
    match host.open_file(&written).await {
        Ok(()) => ActionOutcome::Executed(label),
        Err(e) => fail(host, label, &e).await,
    }
}

async fn fail<H: EditorHost + ?Sized>(host: &H, label: String, error: &anyhow::Error) -> ActionOutcome {
    warn!(action = %label, "Action failed: {:#}", error);
    host.notify(&format!("Failed to {label}: {error:#}")).await;
    ActionOutcome::Failed(label)
}
