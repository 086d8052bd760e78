use std::collections::VecDeque;

use ratatui::prelude::{Buffer, Rect};
use ratatui::style::Stylize;
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Paragraph, Widget};

const MAX_LINES: usize = 500;

/// Output of the shell the assistant's commands run in.
#[derive(Debug, Default)]
pub struct TuiTerminal {
    lines: VecDeque<String>,
}

impl TuiTerminal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, line: String) {
        if self.lines.len() == MAX_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }
}

impl Widget for &TuiTerminal {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let block = Block::default().borders(Borders::TOP).title(" Terminal ".bold());
        let inner = block.inner(area);
        block.render(area, buf);

        // Bottom-anchored: only the newest lines that fit.
        let skip = self.lines.len().saturating_sub(inner.height as usize);
        let lines: Vec<Line> = self.lines.iter().skip(skip).map(|l| Line::from(l.as_str())).collect();
        Paragraph::new(lines).render(inner, buf);
    }
}
