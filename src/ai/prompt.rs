//! Prompt building for chat turns.
//!
//! Editor context (selection, active file) is appended to the user's text
//! as labelled sections so the model can tell it apart from the question.

use crate::config::ContextSettings;
use crate::editor::EditorSnapshot;

/// Collect the editor context enabled by `settings`. Empty when there is no
/// active editor or nothing is enabled.
pub fn build_context_augment(editor: Option<&EditorSnapshot>, settings: &ContextSettings) -> String {
    let Some(editor) = editor else {
        return String::new();
    };

    let mut augment = String::new();
    if settings.include_selection {
        if let Some(selection) = editor.selection.as_deref().filter(|s| !s.is_empty()) {
            augment.push_str("\n\n[Selection]\n");
            augment.push_str(selection);
        }
    }
    if settings.include_active_file {
        augment.push_str(&format!("\n\n[File: {}]\n", editor.path.display()));
        augment.push_str(&editor.contents);
    }
    augment.trim().to_string()
}

/// The text actually sent (and stored) as the user message.
pub fn compose_user_turn(text: &str, context: &str) -> String {
    if context.is_empty() {
        text.to_string()
    } else {
        format!("{text}\n\n[Context]\n{context}")
    }
}
