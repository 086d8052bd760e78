//! Event handling system for the application.
//!
//! Three channels feed the main loop:
//!
//! - **User events**: terminal input (keys, resize), read on a dedicated
//!   thread so input is never blocked by other work.
//! - **Panel messages**: the presentation protocol posted by the chat
//!   session worker (`models`, `assistantDelta`, ...). High-frequency while a
//!   reply streams, so it has its own channel.
//! - **App events**: low-frequency coordination from background tasks, such as
//!   a confirmation the action dispatcher is waiting on, or shell output.
//!
//! # Submodules
//!
//! - `chat`: key handling for the chat panel

pub mod chat;

use std::thread;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::debug;

use crate::ai::client::ModelDescriptor;

/// Terminal input: keyboard, mouse and resize events.
pub type UserEvent = crossterm::event::Event;

/// Spawn the input thread and return its event stream.
///
/// The thread ends on its own once the receiver is dropped.
pub fn init_user_event() -> Receiver<std::io::Result<UserEvent>> {
    let (tx, rx) = mpsc::channel(64);
    thread::spawn(move || {
        loop {
            if tx.blocking_send(crossterm::event::read()).is_err() {
                break;
            }
        }
    });
    rx
}

// =============================================================================
// Presentation protocol
// =============================================================================

/// Messages from the session worker to whatever renders the chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PanelMessage {
    Models {
        models: Vec<ModelDescriptor>,
        #[serde(rename = "defaultModel")]
        default_model: Option<String>,
    },
    Error {
        text: String,
    },
    AssistantStart,
    AssistantDelta {
        text: String,
    },
    AssistantEnd,
    /// Text to place in the input box without sending it.
    Prefill {
        text: String,
    },
}

/// Requests from the chat panel to its session worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PanelRequest {
    Chat {
        #[serde(default)]
        model: Option<String>,
        text: String,
    },
    RefreshModels,
    ChatWithSelection,
    InsertLastResponse,
    NewFileFromLastResponse,
    ReplaceFileWithLastResponse,
    RunTerminalCommand,
}

/// Sending half of the presentation channel.
///
/// A closed panel is not an error for the sender: messages are dropped and
/// logged, and the worker carries on until it is aborted.
#[derive(Debug, Clone)]
pub struct PanelSender {
    tx: UnboundedSender<PanelMessage>,
}

impl PanelSender {
    pub fn channel() -> (Self, UnboundedReceiver<PanelMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn post(&self, message: PanelMessage) {
        if let Err(e) = self.tx.send(message) {
            debug!(message = ?e.0, "Panel closed; dropping message");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// =============================================================================
// Application Events (Global Event Channel)
// =============================================================================

/// Low-frequency events for the main loop.
///
/// `Confirm` and `Input` carry a oneshot reply; the requesting task waits on
/// it, so the loop must always answer (dropping the sender counts as "no").
#[non_exhaustive]
#[derive(Debug)]
pub enum AppEvent {
    Confirm {
        question: String,
        accept: String,
        reply: oneshot::Sender<bool>,
    },
    Input {
        prompt: String,
        default: Option<String>,
        reply: oneshot::Sender<Option<String>>,
    },
    Notice {
        message: String,
    },
    /// One line of output from the shell terminal.
    TerminalOutput {
        line: String,
    },
    UpdateAvailable {
        version: String,
        url: String,
    },
}

/// Unbounded: app events are rare and are sent from synchronous contexts too.
pub fn init_app_eventsource() -> (UnboundedSender<AppEvent>, UnboundedReceiver<AppEvent>) {
    mpsc::unbounded_channel()
}
