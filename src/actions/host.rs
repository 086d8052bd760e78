//! What actions need from their surroundings: a way to ask the user, the
//! active editor, the filesystem and a terminal.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tracing::info;

use crate::editor::{ActiveFile, EditorSnapshot};
use crate::shell::ShellTerminal;

/// Interaction with the user.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask a yes/no question. `accept` labels the positive answer
    /// ("Run", "Create"); anything else, including no answer, is "no".
    async fn confirm(&self, question: &str, accept: &str) -> bool;

    /// Ask for a line of text. `None` means the user dismissed the prompt.
    async fn ask_input(&self, prompt: &str, default: Option<&str>) -> Option<String>;

    async fn notify(&self, message: &str);
}

/// Editor and workspace operations the action dispatcher and the panel
/// commands perform.
#[async_trait]
pub trait EditorHost: Prompter {
    /// `None` when no editor is active.
    async fn editor_snapshot(&self) -> Result<Option<EditorSnapshot>>;

    /// Write `content` to `path`, creating parent directories. Returns the
    /// resolved path.
    async fn write_file(&self, path: &str, content: &str) -> Result<PathBuf>;

    /// Make `path` the active editor.
    async fn open_file(&self, path: &Path) -> Result<()>;

    async fn run_in_terminal(&self, command: &str) -> Result<()>;

    /// Insert at the cursor of the active editor. `false` when none is active.
    async fn insert_at_cursor(&self, text: &str) -> Result<bool>;

    /// Replace the whole active file. `false` when none is active.
    async fn replace_active_file(&self, text: &str) -> Result<bool>;
}

/// Host backed by the local filesystem and a shell subprocess.
pub struct LocalHost<P> {
    prompter: P,
    root: PathBuf,
    /// Only locked on blocking threads when file I/O is involved.
    active: Arc<Mutex<Option<ActiveFile>>>,
    terminal: tokio::sync::Mutex<ShellTerminal>,
}

impl<P: Prompter> LocalHost<P> {
    /// Relative paths are resolved against `root`.
    pub fn new(prompter: P, root: impl Into<PathBuf>, terminal: ShellTerminal) -> Self {
        Self {
            prompter,
            root: root.into(),
            active: Arc::new(Mutex::new(None)),
            terminal: tokio::sync::Mutex::new(terminal),
        }
    }

    pub fn with_active_file(self, file: Option<ActiveFile>) -> Self {
        if let Ok(mut active) = self.active.lock() {
            *active = file;
        }
        self
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    fn with_active<T>(&self, f: impl FnOnce(&mut Option<ActiveFile>) -> Result<T>) -> Result<T> {
        let mut active = self
            .active
            .lock()
            .map_err(|e| anyhow!("Failed to lock active editor: {}", e))?;
        f(&mut active)
    }

    /// Like `with_active`, on the blocking pool, for closures that touch the
    /// file on disk.
    async fn with_active_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Option<ActiveFile>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let active = Arc::clone(&self.active);
        tokio::task::spawn_blocking(move || {
            let mut active = active
                .lock()
                .map_err(|e| anyhow!("Failed to lock active editor: {}", e))?;
            f(&mut active)
        })
        .await
        .context("Active editor task failed")?
    }
}

#[async_trait]
impl<P: Prompter> Prompter for LocalHost<P> {
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
impl<P: Prompter> EditorHost for LocalHost<P> {
    async fn editor_snapshot(&self) -> Result<Option<EditorSnapshot>> {
        self.with_active_blocking(|active| match active {
            Some(file) => file
                .snapshot()
                .map(Some)
                .with_context(|| format!("Failed to read {}", file.path().display())),
            None => Ok(None),
        })
        .await
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<PathBuf> {
        let path = self.resolve(path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), bytes = content.len(), "Wrote file");
        Ok(path)
    }

    async fn open_file(&self, path: &Path) -> Result<()> {
        self.with_active(|active| {
            *active = Some(ActiveFile::new(path));
            Ok(())
        })?;
        self.prompter
            .notify(&format!("Opened {}", path.display()))
            .await;
        Ok(())
    }

    async fn run_in_terminal(&self, command: &str) -> Result<()> {
        info!(command, "Running command in terminal");
        self.terminal.lock().await.send_text(command).await
    }

    async fn insert_at_cursor(&self, text: &str) -> Result<bool> {
        let text = text.to_string();
        self.with_active_blocking(move |active| match active {
            Some(file) => {
                file.insert_at_cursor(&text)
                    .with_context(|| format!("Failed to insert into {}", file.path().display()))?;
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }

    async fn replace_active_file(&self, text: &str) -> Result<bool> {
        let text = text.to_string();
        self.with_active_blocking(move |active| match active {
            Some(file) => {
                file.replace_contents(&text)
                    .with_context(|| format!("Failed to replace {}", file.path().display()))?;
                Ok(true)
            }
            None => Ok(false),
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing::ScriptedPrompter;
    use crate::editor::Position;
    use crate::shell::OutputSink;
    use std::fs;

    fn host(root: &Path) -> LocalHost<ScriptedPrompter> {
        LocalHost::new(ScriptedPrompter::default(), root, ShellTerminal::new(OutputSink::Inherit))
    }

    #[tokio::test]
    async fn test_write_file_resolves_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(dir.path());

        let written = host.write_file("web/index.html", "<p>hi</p>").await.unwrap();
        assert_eq!(written, dir.path().join("web/index.html"));
        assert_eq!(fs::read_to_string(written).unwrap(), "<p>hi</p>");
    }

    #[tokio::test]
    async fn test_no_active_editor() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(dir.path());

        assert!(host.editor_snapshot().await.unwrap().is_none());
        assert!(!host.insert_at_cursor("x").await.unwrap());
        assert!(!host.replace_active_file("x").await.unwrap());
    }

    #[tokio::test]
    async fn test_opened_file_becomes_active() {
        let dir = tempfile::tempdir().unwrap();
        let host = host(dir.path());
        let path = host.write_file("a.txt", "abc").await.unwrap();

        host.open_file(&path).await.unwrap();
        assert_eq!(host.prompter.notices(), [format!("Opened {}", path.display())]);

        assert!(host.insert_at_cursor(">").await.unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), ">abc");
        assert_eq!(host.editor_snapshot().await.unwrap().unwrap().contents, ">abc");

        assert!(host.replace_active_file("new").await.unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
    }

    #[tokio::test]
    async fn test_active_file_cursor_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.txt");
        fs::write(&path, "line one\nline two\n").unwrap();
        let host = host(dir.path())
            .with_active_file(Some(ActiveFile::new(&path).with_cursor(Position::new(1, 5))));

        assert!(host.insert_at_cursor("number ").await.unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "line one\nline number two\n");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_concurrent_inserts_on_single_thread_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.txt");
        fs::write(&path, "").unwrap();
        let host = std::sync::Arc::new(host(dir.path()).with_active_file(Some(ActiveFile::new(&path))));

        let inserts = (0..8).map(|_| {
            let host = host.clone();
            tokio::spawn(async move { host.insert_at_cursor("x").await.unwrap() })
        });
        for inserted in futures::future::join_all(inserts).await {
            assert!(inserted.unwrap());
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "x".repeat(8));
        assert_eq!(host.editor_snapshot().await.unwrap().unwrap().contents, "x".repeat(8));
    }
}
