//! Shell subprocess used as the "integrated terminal".
//!
//! Commands are written to the shell's stdin as if typed. Output is read
//! line by line and forwarded to the UI as app events, or left attached to
//! our own stdout/stderr for the line-oriented `ask` mode.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::event::AppEvent;

/// Where the shell's output goes.
#[derive(Debug, Clone)]
pub enum OutputSink {
    Events(UnboundedSender<AppEvent>),
    Inherit,
}

struct RunningShell {
    child: Child,
    stdin: ChildStdin,
}

/// Lazily started shell. One instance is reused while it stays alive and
/// replaced by a fresh one once it has exited.
pub struct ShellTerminal {
    sink: OutputSink,
    running: Option<RunningShell>,
}

impl ShellTerminal {
    pub fn new(sink: OutputSink) -> Self {
        Self { sink, running: None }
    }

    /// `$SHELL`, falling back to the platform default.
    fn shell_program() -> String {
        if cfg!(windows) {
            return std::env::var("COMSPEC").unwrap_or_else(|_| "cmd".to_string());
        }
        std::env::var("SHELL")
            .ok()
            .filter(|shell| !shell.trim().is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }

    pub fn is_running(&mut self) -> bool {
        match self.running.as_mut().map(|shell| shell.child.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                info!(%status, "Shell exited");
                false
            }
            Some(Err(e)) => {
                error!("Failed to poll shell process: {}", e);
                false
            }
            None => false,
        }
    }

    fn spawn(&self) -> Result<RunningShell> {
        let program = Self::shell_program();
        let (stdout, stderr) = match self.sink {
            OutputSink::Events(_) => (Stdio::piped(), Stdio::piped()),
            OutputSink::Inherit => (Stdio::inherit(), Stdio::inherit()),
        };

        let mut cmd = Command::new(&program);
        cmd.stdin(Stdio::piped())
            .stdout(stdout)
            .stderr(stderr)
            .kill_on_drop(true);
        if let Ok(cwd) = std::env::current_dir() {
            cmd.current_dir(cwd);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to start shell '{program}'"))?;
        let stdin = child
            .stdin
            .take()
            .context("Shell stdin was not captured")?;

        if let OutputSink::Events(events) = &self.sink {
            if let Some(stdout) = child.stdout.take() {
                forward_lines(stdout, events.clone());
            }
            if let Some(stderr) = child.stderr.take() {
                forward_lines(stderr, events.clone());
            }
        }

        info!(shell = %program, pid = child.id(), "Started shell");
        Ok(RunningShell { child, stdin })
    }

    /// Write `text` and a newline to the shell, starting one if needed.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        if !self.is_running() {
            self.running = Some(self.spawn()?);
        }
        let shell = self
            .running
            .as_mut()
            .context("Shell is not running")?;

        debug!(command = text, "Writing to shell");
        shell
            .stdin
            .write_all(text.as_bytes())
            .await
            .context("Failed to write command to shell")?;
        shell
            .stdin
            .write_all(b"\n")
            .await
            .context("Failed to write newline to shell")?;
        shell.stdin.flush().await.context("Failed to flush shell stdin")?;
        Ok(())
    }
}

fn forward_lines<R>(reader: R, events: UnboundedSender<AppEvent>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if events.send(AppEvent::TerminalOutput { line }).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Shell read error: {}", e);
                    break;
                }
            }
        }
    });
}
