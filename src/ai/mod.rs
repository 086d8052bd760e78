//! Chat with an OpenRouter-compatible service.
//!
//! `client` and `sse` talk to the network, `prompt` and `parser` deal with
//! text going in and coming out, `session` keeps one conversation and
//! `panel` runs that conversation on its own task.

pub mod client;
pub mod panel;
pub mod parser;
pub mod prompt;
pub mod session;
pub mod sse;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ChatMessage, ChatTransport, ModelDescriptor, OpenRouterClient, Role, TransportError};
pub use panel::{PanelHandle, PanelManager};
pub use session::{ChatSession, SessionError, TurnState};
