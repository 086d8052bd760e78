//! The chat panel: transcript, model picker line and input box.

use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Widget};
use unicode_width::UnicodeWidthChar;

use crate::ai::client::ModelDescriptor;
use crate::ai::session::EMPTY_RESPONSE_PLACEHOLDER;
use crate::event::PanelMessage;

const MAX_INPUT_ROWS: u16 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
    Error,
    Notice,
}

impl Speaker {
    fn label(self) -> &'static str {
        match self {
            Speaker::User => "You",
            Speaker::Assistant => "Assistant",
            Speaker::Error => "Error",
            Speaker::Notice => "Notice",
        }
    }

    fn style(self) -> Style {
        match self {
            Speaker::User => Style::default().fg(Color::Cyan),
            Speaker::Assistant => Style::default().fg(Color::Green),
            Speaker::Error => Style::default().fg(Color::Red),
            Speaker::Notice => Style::default().fg(Color::Yellow),
        }
        .add_modifier(Modifier::BOLD)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub speaker: Speaker,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct ChatView {
    entries: Vec<ChatEntry>,
    streaming: bool,
    input: String,
    /// Cursor position in the input, in chars.
    cursor: usize,
    /// Transcript lines scrolled up from the bottom.
    scroll: usize,
    models: Vec<ModelDescriptor>,
    selected_model: Option<String>,
    model_filter: String,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Apply one presentation message from the session worker.
    pub fn apply(&mut self, message: PanelMessage) {
        match message {
            PanelMessage::Models { models, default_model } => {
                self.selected_model = default_model.or_else(|| models.first().map(|m| m.id.clone()));
                self.models = models;
            }
            PanelMessage::Error { text } => {
                if self.streaming {
                    self.streaming = false;
                    self.drop_empty_reply();
                }
                self.push(Speaker::Error, text);
            }
            PanelMessage::AssistantStart => {
                self.streaming = true;
                self.push(Speaker::Assistant, String::new());
            }
            PanelMessage::AssistantDelta { text } => match self.entries.last_mut() {
                Some(entry) if self.streaming && entry.speaker == Speaker::Assistant => {
                    entry.text.push_str(&text);
                    self.scroll = 0;
                }
                _ => self.push(Speaker::Assistant, text),
            },
            PanelMessage::AssistantEnd => {
                self.streaming = false;
                if let Some(entry) = self.entries.last_mut() {
                    if entry.speaker == Speaker::Assistant && entry.text.is_empty() {
                        entry.text = EMPTY_RESPONSE_PLACEHOLDER.to_string();
                    }
                }
            }
            PanelMessage::Prefill { text } => self.set_input(text),
        }
    }

    fn drop_empty_reply(&mut self) {
        if matches!(self.entries.last(), Some(e) if e.speaker == Speaker::Assistant && e.text.is_empty()) {
            self.entries.pop();
        }
    }

    fn push(&mut self, speaker: Speaker, text: String) {
        self.entries.push(ChatEntry { speaker, text });
        self.scroll = 0;
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.push(Speaker::User, text.into());
    }

    pub fn push_notice(&mut self, text: impl Into<String>) {
        self.push(Speaker::Notice, text.into());
    }

    // =========================================================================
    // Input editing
    // =========================================================================

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: String) {
        self.cursor = text.chars().count();
        self.input = text;
    }

    pub fn take_input(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.input)
    }

    fn byte_index(&self, char_index: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_index)
            .map_or(self.input.len(), |(i, _)| i)
    }

    pub fn insert_char(&mut self, c: char) {
        let at = self.byte_index(self.cursor);
        self.input.insert(at, c);
        self.cursor += 1;
    }

    pub fn delete_char(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = self.byte_index(self.cursor);
        self.input.remove(at);
    }

    pub fn delete_char_forward(&mut self) {
        if self.cursor < self.input.chars().count() {
            let at = self.byte_index(self.cursor);
            self.input.remove(at);
        }
    }

    pub fn move_cursor(&mut self, delta: isize) {
        let len = self.input.chars().count();
        self.cursor = self.cursor.saturating_add_signed(delta).min(len);
    }

    pub fn move_cursor_to_start(&mut self) {
        self.cursor = 0;
    }

    pub fn move_cursor_to_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    /// Negative scrolls back through the transcript.
    pub fn scroll(&mut self, delta: isize) {
        self.scroll = self.scroll.saturating_add_signed(-delta);
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = 0;
    }

    pub fn is_scrolled(&self) -> bool {
        self.scroll > 0
    }

    // =========================================================================
    // Model picker
    // =========================================================================

    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    pub fn model_filter(&self) -> &str {
        &self.model_filter
    }

    /// Models whose label or id contains the filter, ignoring case.
    pub fn filtered_models(&self) -> Vec<&ModelDescriptor> {
        let filter = self.model_filter.to_lowercase();
        self.models
            .iter()
            .filter(|m| {
                filter.is_empty()
                    || m.label().to_lowercase().contains(&filter)
                    || m.id.to_lowercase().contains(&filter)
            })
            .collect()
    }

    /// Keeps the selection when it still matches, else picks the first match.
    pub fn set_model_filter(&mut self, filter: impl Into<String>) {
        self.model_filter = filter.into().trim().to_string();
        let filtered = self.filtered_models();
        let keep = filtered
            .iter()
            .any(|m| Some(m.id.as_str()) == self.selected_model.as_deref());
        if !keep {
            if let Some(first) = filtered.first().map(|m| m.id.clone()) {
                self.selected_model = Some(first);
            }
        }
    }

    pub fn cycle_model(&mut self, step: isize) {
        let filtered = self.filtered_models();
        if filtered.is_empty() {
            return;
        }
        let current = filtered
            .iter()
            .position(|m| Some(m.id.as_str()) == self.selected_model.as_deref());
        let next = match current {
            Some(i) => (i as isize + step).rem_euclid(filtered.len() as isize) as usize,
            None => 0,
        };
        self.selected_model = Some(filtered[next].id.clone());
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Input rows hard-wrapped at `width` columns, plus the cursor (col, row).
    fn layout_input(&self, width: usize) -> (Vec<String>, (usize, usize)) {
        let width = width.max(1);
        let mut rows = vec![String::new()];
        let mut col = 0;
        let mut cursor = None;
        for (i, ch) in self.input.chars().enumerate() {
            let w = ch.width().unwrap_or(0);
            if ch != '\n' && col + w > width {
                rows.push(String::new());
                col = 0;
            }
            if i == self.cursor {
                cursor = Some((col, rows.len() - 1));
            }
            if ch == '\n' {
                rows.push(String::new());
                col = 0;
            } else if let Some(row) = rows.last_mut() {
                row.push(ch);
                col += w;
            }
        }
        let cursor = cursor.unwrap_or((col.min(width - 1), rows.len() - 1));
        (rows, cursor)
    }

    fn input_height(&self, width: u16) -> u16 {
        let (rows, _) = self.layout_input(width as usize);
        (rows.len() as u16).clamp(1, MAX_INPUT_ROWS) + 2
    }

    /// Header, transcript and input areas.
    fn split(&self, area: Rect) -> [Rect; 3] {
        let input_height = self.input_height(area.width.saturating_sub(2));
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(1),
                Constraint::Length(input_height),
            ])
            .split(area);
        [chunks[0], chunks[1], chunks[2]]
    }

    /// Screen position of the input cursor when the view is drawn in `area`.
    pub fn cursor_position(&self, area: Rect) -> (u16, u16) {
        let input = self.split(area)[2];
        let inner_width = input.width.saturating_sub(2);
        let (rows, (col, row)) = self.layout_input(inner_width as usize);
        let visible = input.height.saturating_sub(2) as usize;
        let first = rows.len().saturating_sub(visible);
        let row = row.saturating_sub(first);
        (input.x + 1 + col as u16, input.y + 1 + row as u16)
    }

    fn transcript_lines(&self, width: usize) -> Vec<Line<'static>> {
        let width = width.max(1);
        let mut lines = Vec::new();
        for entry in &self.entries {
            lines.push(Line::from(Span::styled(entry.speaker.label(), entry.speaker.style())));
            for row in textwrap::wrap(&entry.text, width) {
                lines.push(Line::from(row.into_owned()));
            }
            lines.push(Line::default());
        }
        if self.streaming {
            lines.push(Line::from("…".dim()));
        }
        lines
    }

    fn header_line(&self) -> Line<'static> {
        let model = self.selected_model.clone().unwrap_or_else(|| "(default model)".to_string());
        let mut spans = vec![" Model: ".bold(), Span::raw(model)];
        if !self.model_filter.is_empty() {
            let count = self.filtered_models().len();
            spans.push(Span::styled(
                format!("  filter \"{}\" ({count})", self.model_filter),
                Style::default().add_modifier(Modifier::DIM),
            ));
        }
        if self.streaming {
            spans.push("  streaming…".italic());
        }
        Line::from(spans)
    }
}

impl Widget for &ChatView {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let [header, transcript, input] = self.split(area);

        self.header_line().render(header, buf);

        let lines = self.transcript_lines(transcript.width as usize);
        let overflow = lines.len().saturating_sub(transcript.height as usize);
        let offset = overflow.saturating_sub(self.scroll.min(overflow));
        Paragraph::new(lines)
            .scroll((offset as u16, 0))
            .render(transcript, buf);

        let block = Block::default().borders(Borders::ALL).title(" Message ");
        let inner = block.inner(input);
        block.render(input, buf);
        let (rows, _) = self.layout_input(inner.width as usize);
        let first = rows.len().saturating_sub(inner.height as usize);
        let rows: Vec<Line> = rows.into_iter().skip(first).map(Line::from).collect();
        Paragraph::new(rows).render(inner, buf);
    }
}
