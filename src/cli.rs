//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::editor::{ActiveFile, LineSelection, Position};

#[derive(Debug, Parser)]
#[command(name = "maiide")]
#[command(about = "Chat with OpenRouter models about your code")]
#[command(version)]
pub struct Args {
    /// Config directory (default: $MAIIDE_CONFIG_DIR or ~/.maiide)
    #[arg(long, global = true, value_name = "DIR")]
    pub config: Option<PathBuf>,

    /// File treated as the active editor
    #[arg(long, global = true, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Cursor in the active file, one-based
    #[arg(long, global = true, value_name = "LINE:COL", requires = "file")]
    pub cursor: Option<Position>,

    /// Selected lines in the active file, one-based and inclusive
    #[arg(long, global = true, value_name = "A-B", requires = "file")]
    pub selection: Option<LineSelection>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Open the chat TUI (the default)
    Chat,
    /// Send one prompt, print the streamed reply, then act on it
    Ask {
        #[arg(short, long)]
        model: Option<String>,
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// List the models the service offers
    Models,
    /// Check for a newer release
    CheckUpdate,
}

impl Args {
    pub fn active_file(&self) -> Option<ActiveFile> {
        let path = self.file.as_ref()?;
        let mut file = ActiveFile::new(path).with_selection(self.selection.clone());
        if let Some(cursor) = self.cursor {
            file = file.with_cursor(cursor);
        }
        Some(file)
    }
}
