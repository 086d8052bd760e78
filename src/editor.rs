//! The "active editor": one file on disk with a cursor and an optional
//! selected line range.
//!
//! Positions are zero-based internally; the CLI accepts one-based values and
//! converts them with the `FromStr` impls below.

use std::fmt;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Cursor position: line and column (in characters), both zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// Parses one-based `LINE` or `LINE:COL`.
impl FromStr for Position {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (line, column) = match s.split_once(':') {
            Some((line, column)) => (line, column),
            None => (s, "1"),
        };
        let line = parse_one_based(line, "line")?;
        let column = parse_one_based(column, "column")?;
        Ok(Self { line, column })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

/// Selected lines, zero-based, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSelection(pub Range<usize>);

/// Parses one-based inclusive `START-END` or a single line `N`.
impl FromStr for LineSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = match s.split_once('-') {
            Some((start, end)) => (start, end),
            None => (s, s),
        };
        let start = parse_one_based(start, "selection start")?;
        let end = parse_one_based(end, "selection end")?;
        if end < start {
            return Err(format!("selection end {} is before start {}", end + 1, start + 1));
        }
        Ok(Self(start..end + 1))
    }
}

fn parse_one_based(value: &str, what: &str) -> Result<usize, String> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(format!("{what} is one-based, got 0")),
        Ok(n) => Ok(n - 1),
        Err(e) => Err(format!("invalid {what} '{value}': {e}")),
    }
}

/// What the chat session may read from the active editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditorSnapshot {
    pub path: PathBuf,
    pub selection: Option<String>,
    pub contents: String,
}

#[derive(Debug, Clone)]
pub struct ActiveFile {
    path: PathBuf,
    cursor: Position,
    selection: Option<LineSelection>,
}

impl ActiveFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cursor: Position::default(),
            selection: None,
        }
    }

    pub fn with_cursor(mut self, cursor: Position) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_selection(mut self, selection: Option<LineSelection>) -> Self {
        self.selection = selection;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn cursor(&self) -> Position {
        self.cursor
    }

    /// Read the file. A file that does not exist yet reads as empty.
    pub fn snapshot(&self) -> io::Result<EditorSnapshot> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };
        let selection = self
            .selection
            .as_ref()
            .map(|LineSelection(range)| select_lines(&contents, range.clone()))
            .filter(|text| !text.is_empty());
        Ok(EditorSnapshot {
            path: self.path.clone(),
            selection,
            contents,
        })
    }

    /// Insert `text` at the cursor and move the cursor past it.
    pub fn insert_at_cursor(&mut self, text: &str) -> io::Result<()> {
        let mut contents = self.snapshot()?.contents;
        let offset = byte_offset(&contents, self.cursor);
        contents.insert_str(offset, text);
        fs::write(&self.path, &contents)?;
        self.cursor = advance(self.cursor_clamped(&contents, offset), text);
        Ok(())
    }

    /// Replace the whole file and reset the cursor to the start.
    pub fn replace_contents(&mut self, text: &str) -> io::Result<()> {
        fs::write(&self.path, text)?;
        self.cursor = Position::default();
        self.selection = None;
        Ok(())
    }

    fn cursor_clamped(&self, contents: &str, offset: usize) -> Position {
        let before = &contents[..offset];
        let line = before.matches('\n').count();
        let column = before.rsplit('\n').next().map(|l| l.chars().count()).unwrap_or(0);
        Position { line, column }
    }
}

fn select_lines(contents: &str, range: Range<usize>) -> String {
    contents
        .split_inclusive('\n')
        .skip(range.start)
        .take(range.len())
        .collect()
}

/// Byte offset of `pos`, clamped to the end of its line and of the text.
fn byte_offset(contents: &str, pos: Position) -> usize {
    let mut offset = 0;
    for (index, line) in contents.split_inclusive('\n').enumerate() {
        if index == pos.line {
            let body = line.strip_suffix('\n').unwrap_or(line);
            let body = body.strip_suffix('\r').unwrap_or(body);
            let column = body
                .char_indices()
                .nth(pos.column)
                .map(|(i, _)| i)
                .unwrap_or(body.len());
            return offset + column;
        }
        offset += line.len();
    }
    contents.len()
}

fn advance(start: Position, text: &str) -> Position {
    let newlines = text.matches('\n').count();
    let tail = text.rsplit('\n').next().unwrap_or("").chars().count();
    if newlines == 0 {
        Position::new(start.line, start.column + tail)
    } else {
        Position::new(start.line + newlines, tail)
    }
}
