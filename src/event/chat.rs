//! Key event handling for the chat panel.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

use crate::ai::panel::PanelHandle;
use crate::ai::session::SessionError;
use crate::ui::chat::ChatView;

/// Handle a key press while no modal or command mode is active.
///
/// `panel` is `None` when no chat panel is open (e.g. no API key yet);
/// typing still works but sending only leaves a notice.
pub fn handle_key_event(chat: &mut ChatView, panel: Option<&PanelHandle>, key_evt: KeyEvent) -> Result<()> {
    match key_evt.code {
        // Ctrl+O: newline in the input
        KeyCode::Char('o') | KeyCode::Char('O') if key_evt.modifiers.contains(KeyModifiers::CONTROL) => {
            chat.insert_char('\n');
        }

        KeyCode::Enter => submit(chat, panel),

        KeyCode::Char(c) if !key_evt.modifiers.contains(KeyModifiers::CONTROL) => chat.insert_char(c),

        KeyCode::Backspace => chat.delete_char(),
        KeyCode::Delete => chat.delete_char_forward(),

        KeyCode::Left => chat.move_cursor(-1),
        KeyCode::Right => chat.move_cursor(1),
        KeyCode::Home => chat.move_cursor_to_start(),
        KeyCode::End
            if key_evt.modifiers.contains(KeyModifiers::SHIFT)
                || key_evt.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            chat.scroll_to_bottom();
        }
        KeyCode::End => chat.move_cursor_to_end(),

        KeyCode::Esc => {
            if chat.is_scrolled() {
                chat.scroll_to_bottom();
            }
        }

        KeyCode::Up if key_evt.modifiers.contains(KeyModifiers::SHIFT) => chat.scroll(-1),
        KeyCode::Down if key_evt.modifiers.contains(KeyModifiers::SHIFT) => chat.scroll(1),
        KeyCode::PageUp => chat.scroll(-10),
        KeyCode::PageDown => chat.scroll(10),

        // Model switching
        KeyCode::BackTab => chat.cycle_model(-1),
        KeyCode::Tab if key_evt.modifiers.contains(KeyModifiers::SHIFT) => chat.cycle_model(-1),
        KeyCode::Tab => chat.cycle_model(1),

        _ => {}
    }
    Ok(())
}

fn submit(chat: &mut ChatView, panel: Option<&PanelHandle>) {
    let input = chat.take_input();
    if input.trim().is_empty() {
        return;
    }
    let Some(panel) = panel else {
        chat.set_input(input);
        chat.push_notice("Chat panel is closed. Press Ctrl+B then o to open it.");
        return;
    };

    let model = chat.selected_model().map(str::to_string);
    match panel.send_chat(model, input.clone()) {
        Ok(()) => chat.push_user(input),
        Err(e) => {
            debug!("Chat not sent: {}", e);
            chat.set_input(input);
            let notice = match e {
                SessionError::Busy => "Wait for the current reply to finish.".to_string(),
                other => other.to_string(),
            };
            chat.push_notice(notice);
        }
    }
}
