//! MAIIDE - chat with OpenRouter models about the code you are editing
//!
//! This library provides:
//! - An OpenRouter transport with SSE streaming (`ai::client`, `ai::sse`)
//! - A conversation session and the single chat panel that runs it
//!   (`ai::session`, `ai::panel`)
//! - Code block and `[ACTION: ...]` handling for finished replies (`actions`)
//! - The TUI front end (`app`, `ui`, `event`) and its settings (`config`)
//!
//! # Example
//!
//! ```no_run
//! use maiide::ai::{ChatSession, OpenRouterClient};
//! use maiide::event::{PanelMessage, PanelSender};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OpenRouterClient::new("sk-or-...")?;
//!     let (panel, mut messages) = PanelSender::channel();
//!     tokio::spawn(async move {
//!         while let Some(message) = messages.recv().await {
//!             if let PanelMessage::AssistantDelta { text } = message {
//!                 print!("{text}");
//!             }
//!         }
//!     });
//!
//!     let mut session = ChatSession::new(Some("You are a concise assistant."));
//!     let reply = session
//!         .send_user_turn(&client, "openrouter/auto", "What is a borrow checker?", "", &panel)
//!         .await?;
//!     println!("\n{} messages in history, {} chars", session.history().len(), reply.len());
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod ai;
pub mod app;
pub mod cli;
pub mod config;
pub mod editor;
pub mod event;
pub mod shell;
pub mod ui;
pub mod updater;
pub mod utils;

// Re-export commonly used types
pub use actions::{ActionDispatcher, ActionOutcome, EditorHost, Prompter};
pub use ai::{ChatSession, OpenRouterClient, PanelHandle, PanelManager};
pub use app::App;
pub use config::Settings;
pub use event::{AppEvent, PanelMessage, PanelRequest, init_app_eventsource, init_user_event};
