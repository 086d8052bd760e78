//! User interface module for the TUI application.
//!
//! The screen is one bordered frame holding the chat view, with the shell
//! output pane underneath once the shell has printed something. Modals are
//! drawn over everything.

use ratatui::buffer::Buffer;
use ratatui::layout::{Constraint, Direction, Flex, Layout, Rect};
use ratatui::style::Stylize;
use ratatui::text::Line;
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Widget, Wrap};

use crate::app::{App, Modal};

pub mod chat;
pub mod terminal;

const TERMINAL_HEIGHT: u16 = 8;

/// Chat and terminal areas inside the outer frame.
fn split(app: &App, area: Rect) -> (Rect, Option<Rect>) {
    let inner = frame_block(app).inner(area);
    if app.tui_terminal.is_empty() {
        return (inner, None);
    }
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(6), Constraint::Length(TERMINAL_HEIGHT)])
        .split(inner);
    (chunks[0], Some(chunks[1]))
}

fn frame_block(app: &App) -> Block<'static> {
    let mode = if app.get_command_mode() {
        " [COMMAND] "
    } else if !app.panel_open() {
        " [CLOSED] "
    } else {
        " "
    };
    let top = Line::from(format!(" MAIIDE{mode}").bold());
    let bottom = if app.get_command_mode() {
        Line::from(" q quit · m model · f filter · r refresh · s selection · i insert · n new file · e replace · t run · k key · o open · c close ")
    } else {
        Line::from(" Ctrl+B commands · Ctrl+O newline · Tab model ")
    };
    Block::new()
        .borders(Borders::ALL)
        .title(top)
        .title_bottom(bottom.dim())
}

/// Hardware cursor position, when the chat input has focus.
pub fn input_cursor(app: &App, area: Rect) -> Option<(u16, u16)> {
    if app.get_command_mode() || app.modal().is_some() {
        return None;
    }
    let (chat_area, _) = split(app, area);
    Some(app.chat.cursor_position(chat_area))
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [rect] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(row);
    rect
}

impl Widget for &Modal {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let width = area.width.saturating_sub(4).min(70);
        let rect = centered(area, width, 6);
        Clear.render(rect, buf);

        let (title, body, hint) = match self {
            Modal::Confirm { question, accept, .. } => (
                " Confirm ",
                question.clone(),
                format!("y/Enter {accept} · n/Esc Cancel"),
            ),
            Modal::Input { prompt, value, masked, .. } => {
                let shown = if *masked {
                    "*".repeat(value.chars().count())
                } else {
                    value.clone()
                };
                (" Input ", format!("{prompt}\n> {shown}"), "Enter OK · Esc Cancel".to_string())
            }
        };
        let block = Block::new()
            .borders(Borders::ALL)
            .title(title.bold())
            .title_bottom(Line::from(hint).dim());
        Paragraph::new(body)
            .wrap(Wrap { trim: false })
            .block(block)
            .render(rect, buf);
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let (chat_area, terminal_area) = split(self, area);
        frame_block(self).render(area, buf);
        self.chat.render(chat_area, buf);
        if let Some(terminal_area) = terminal_area {
            self.tui_terminal.render(terminal_area, buf);
        }
        if let Some(modal) = self.modal() {
            modal.render(area, buf);
        }
    }
}
