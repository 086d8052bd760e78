//! [`Prompter`] implementations for the two front ends.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::host::Prompter;
use crate::event::AppEvent;

/// Prompts shown as modals by the TUI main loop.
#[derive(Debug, Clone)]
pub struct ChannelPrompter {
    events: UnboundedSender<AppEvent>,
}

impl ChannelPrompter {
    pub fn new(events: UnboundedSender<AppEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl Prompter for ChannelPrompter {
    async fn confirm(&self, question: &str, accept: &str) -> bool {
        let (reply, answer) = oneshot::channel();
        let event = AppEvent::Confirm {
            question: question.to_string(),
            accept: accept.to_string(),
            reply,
        };
        if self.events.send(event).is_err() {
            debug!(question, "UI is gone; treating confirmation as declined");
            return false;
        }
        answer.await.unwrap_or(false)
    }

    async fn ask_input(&self, prompt: &str, default: Option<&str>) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        let event = AppEvent::Input {
            prompt: prompt.to_string(),
            default: default.map(str::to_string),
            reply,
        };
        if self.events.send(event).is_err() {
            debug!(prompt, "UI is gone; treating input as dismissed");
            return None;
        }
        answer.await.ok().flatten()
    }

    async fn notify(&self, message: &str) {
        let event = AppEvent::Notice {
            message: message.to_string(),
        };
        if self.events.send(event).is_err() {
            debug!(message, "UI is gone; dropping notice");
        }
    }
}

/// Prompts on stderr, answers from stdin. Used by `ask` mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdioPrompter;

impl StdioPrompter {
    async fn read_answer(prompt: String) -> Option<String> {
        let read = tokio::task::spawn_blocking(move || {
            let mut stderr = io::stderr();
            write!(stderr, "{prompt}")?;
            stderr.flush()?;
            let mut line = String::new();
            let n = io::stdin().lock().read_line(&mut line)?;
            Ok::<_, io::Error>((n > 0).then_some(line))
        })
        .await;
        match read {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                error!("Failed to read answer from stdin: {}", e);
                None
            }
            Err(e) => {
                error!("Prompt task failed: {}", e);
                None
            }
        }
    }
}

/// "y", "yes" or the accept label itself, case-insensitively.
fn is_accepted(answer: &str, accept: &str) -> bool {
    let answer = answer.trim();
    ["y", "yes", accept]
        .iter()
        .any(|word| answer.eq_ignore_ascii_case(word))
}

/// Empty answer takes the default; end of input dismisses.
fn input_value(answer: Option<String>, default: Option<&str>) -> Option<String> {
    let answer = answer?;
    let answer = answer.trim();
    if answer.is_empty() {
        default.map(str::to_string)
    } else {
        Some(answer.to_string())
    }
}

#[async_trait]
impl Prompter for StdioPrompter {
    async fn confirm(&self, question: &str, accept: &str) -> bool {
        let answer = Self::read_answer(format!("{question} [{accept}/Skip] ")).await;
        answer.is_some_and(|a| is_accepted(&a, accept))
    }

    async fn ask_input(&self, prompt: &str, default: Option<&str>) -> Option<String> {
        let shown = match default {
            Some(default) => format!("{prompt} [{default}]: "),
            None => format!("{prompt}: "),
        };
        input_value(Self::read_answer(shown).await, default)
    }

    async fn notify(&self, message: &str) {
        eprintln!("{message}");
    }
}
