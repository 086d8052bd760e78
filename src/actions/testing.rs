//! Scripted prompter and recording host for action tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;

use super::host::{EditorHost, Prompter};
use crate::editor::EditorSnapshot;

/// Answers prompts from queues; an empty queue answers "no" / dismissed.
#[derive(Default)]
pub(crate) struct ScriptedPrompter {
    confirms: Mutex<VecDeque<bool>>,
    inputs: Mutex<VecDeque<Option<String>>>,
    asked: Mutex<Vec<String>>,
    notices: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub(crate) fn confirming(self, answers: &[bool]) -> Self {
        self.confirms.lock().unwrap().extend(answers);
        self
    }

    pub(crate) fn answering(self, answers: &[Option<&str>]) -> Self {
        self.inputs
            .lock()
            .unwrap()
            .extend(answers.iter().map(|a| a.map(str::to_string)));
        self
    }

    /// Every question and input prompt shown, in order.
    pub(crate) fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }

    pub(crate) fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, question: &str, accept: &str) -> bool {
        self.asked.lock().unwrap().push(format!("{question} [{accept}]"));
        self.confirms.lock().unwrap().pop_front().unwrap_or(false)
    }

    async fn ask_input(&self, prompt: &str, default: Option<&str>) -> Option<String> {
        self.asked
            .lock()
            .unwrap()
            .push(format!("{prompt} ({})", default.unwrap_or("")));
        self.inputs.lock().unwrap().pop_front().flatten()
    }

    async fn notify(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HostCall {
    Write { path: String, content: String },
    Open(PathBuf),
    Run(String),
    Insert(String),
    Replace(String),
}

/// Records host operations instead of performing them.
#[derive(Default)]
pub(crate) struct RecordingHost {
    pub(crate) prompter: ScriptedPrompter,
    snapshot: Option<EditorSnapshot>,
    fail_writes: bool,
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    pub(crate) fn new(prompter: ScriptedPrompter) -> Self {
        Self {
            prompter,
            ..Self::default()
        }
    }

    pub(crate) fn with_editor(mut self, snapshot: EditorSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub(crate) fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Prompter for RecordingHost {
    async fn confirm(&self, question: &str, accept: &str) -> bool {
        self.prompter.confirm(question, accept).await
    }

    async fn ask_input(&self, prompt: &str, default: Option<&str>) -> Option<String> {
        self.prompter.ask_input(prompt, default).await
    }

    async fn notify(&self, message: &str) {
        self.prompter.notify(message).await
    }
}

#[async_trait]
impl EditorHost for RecordingHost {
    async fn editor_snapshot(&self) -> Result<Option<EditorSnapshot>> {
        Ok(self.snapshot.clone())
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<PathBuf> {
        if self.fail_writes {
            bail!("permission denied: {path}");
        }
        self.record(HostCall::Write {
            path: path.to_string(),
            content: content.to_string(),
        });
        Ok(PathBuf::from(path))
    }

    async fn open_file(&self, path: &Path) -> Result<()> {
        self.record(HostCall::Open(path.to_path_buf()));
        Ok(())
    }

    async fn run_in_terminal(&self, command: &str) -> Result<()> {
        self.record(HostCall::Run(command.to_string()));
        Ok(())
    }

    async fn insert_at_cursor(&self, text: &str) -> Result<bool> {
        if self.snapshot.is_none() {
            return Ok(false);
        }
        self.record(HostCall::Insert(text.to_string()));
        Ok(true)
    }

    async fn replace_active_file(&self, text: &str) -> Result<bool> {
        if self.snapshot.is_none() {
            return Ok(false);
        }
        self.record(HostCall::Replace(text.to_string()));
        Ok(true)
    }
}
