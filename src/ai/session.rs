//! Conversation state for one chat panel.
//!
//! The session owns the message history sent with every request. History
//! only ever grows, and only by committed turns: the user message is kept
//! as soon as the request starts, the assistant message only once the reply
//! has streamed to completion.

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::event::{PanelMessage, PanelSender};

use super::client::{ChatMessage, ChatTransport, TransportError};
use super::prompt;

/// Stored instead of an empty reply so the history never holds a blank turn.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "(no content)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Streaming,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("a response is still streaming")]
    Busy,

    #[error("the chat panel is closed")]
    PanelClosed,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Default)]
pub struct ChatSession {
    history: Vec<ChatMessage>,
    state: TurnState,
    last_response: Option<String>,
}

impl ChatSession {
    /// A blank system prompt is treated as none.
    pub fn new(system_prompt: Option<&str>) -> Self {
        let history = system_prompt
            .filter(|p| !p.trim().is_empty())
            .map(ChatMessage::system)
            .into_iter()
            .collect();
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Text of the most recent committed assistant turn.
    pub fn last_response(&self) -> Option<&str> {
        self.last_response.as_deref()
    }

    /// Start a turn with the composed user message. Fails without touching
    /// history while another turn is streaming.
    pub fn begin_turn(&mut self, user_content: impl Into<String>) -> Result<(), SessionError> {
        if self.state == TurnState::Streaming {
            return Err(SessionError::Busy);
        }
        self.history.push(ChatMessage::user(user_content));
        self.state = TurnState::Streaming;
        Ok(())
    }

    /// Finish the current turn with the full reply and return the stored text.
    pub fn commit_turn(&mut self, reply: String) -> String {
        let reply = if reply.is_empty() {
            EMPTY_RESPONSE_PLACEHOLDER.to_string()
        } else {
            reply
        };
        self.history.push(ChatMessage::assistant(reply.clone()));
        self.last_response = Some(reply.clone());
        self.state = TurnState::Idle;
        reply
    }

    /// Abandon the current turn. The user message stays; nothing else is kept.
    pub fn cancel_turn(&mut self) {
        if self.state == TurnState::Streaming {
            debug!("Cancelling streaming turn");
        }
        self.state = TurnState::Idle;
    }

    /// Run one user turn against `transport`, relaying the reply to `panel`.
    ///
    /// Posts `assistantStart`, one `assistantDelta` per text fragment, then
    /// `assistantEnd`; on failure posts `error` instead and commits nothing.
    /// Dropping the returned future mid-stream leaves the session
    /// [`TurnState::Streaming`] until [`cancel_turn`](Self::cancel_turn).
    pub async fn send_user_turn<T: ChatTransport + ?Sized>(
        &mut self,
        transport: &T,
        model: &str,
        text: &str,
        context: &str,
        panel: &PanelSender,
    ) -> Result<String, SessionError> {
        self.begin_turn(prompt::compose_user_turn(text, context))?;
        info!(model, messages = self.history.len(), "Starting chat turn");
        panel.post(PanelMessage::AssistantStart);

        match self.stream_reply(transport, model, panel).await {
            Ok(reply) => {
                panel.post(PanelMessage::AssistantEnd);
                let reply = self.commit_turn(reply);
                info!(chars = reply.chars().count(), "Chat turn complete");
                Ok(reply)
            }
            Err(e) => {
                warn!(error = %e, "Chat turn failed");
                self.cancel_turn();
                panel.post(PanelMessage::Error { text: e.to_string() });
                Err(e.into())
            }
        }
    }

    async fn stream_reply<T: ChatTransport + ?Sized>(
        &self,
        transport: &T,
        model: &str,
        panel: &PanelSender,
    ) -> Result<String, TransportError> {
        let mut deltas = transport.chat_stream(model, &self.history).await?;
        let mut reply = String::new();
        while let Some(delta) = deltas.next().await {
            let delta = delta?;
            reply.push_str(&delta);
            panel.post(PanelMessage::AssistantDelta { text: delta });
        }
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::Role;
    use crate::ai::testing::ScriptedTransport;

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<PanelMessage>) -> Vec<PanelMessage> {
        let mut out = Vec::new();
        while let Ok(message) = rx.try_recv() {
            out.push(message);
        }
        out
    }

    #[test]
    fn test_system_prompt_is_first_and_optional() {
        let session = ChatSession::new(Some("Be brief."));
        assert_eq!(session.history(), [ChatMessage::system("Be brief.")]);
        assert!(ChatSession::new(Some("  ")).history().is_empty());
        assert!(ChatSession::new(None).history().is_empty());
    }

    #[tokio::test]
    async fn test_successful_turn_commits_and_relays() {
        let transport = ScriptedTransport::new().reply(["Hel", "lo"]);
        let (panel, mut rx) = PanelSender::channel();
        let mut session = ChatSession::new(Some("sys"));

        let reply = session
            .send_user_turn(&transport, "m", "hi", "[Selection]\nx", &panel)
            .await
            .unwrap();

        assert_eq!(reply, "Hello");
        assert_eq!(session.last_response(), Some("Hello"));
        assert_eq!(session.state(), TurnState::Idle);
        let roles: Vec<Role> = session.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
        assert_eq!(session.history()[1].content, "hi\n\n[Context]\n[Selection]\nx");

        assert_eq!(
            drain(&mut rx),
            [
                PanelMessage::AssistantStart,
                PanelMessage::AssistantDelta { text: "Hel".into() },
                PanelMessage::AssistantDelta { text: "lo".into() },
                PanelMessage::AssistantEnd,
            ]
        );
        // The request carried the history up to and including the user turn.
        assert_eq!(transport.requests()[0].len(), 2);
    }

    #[tokio::test]
    async fn test_empty_reply_stores_placeholder() {
        let transport = ScriptedTransport::new().reply(Vec::<&str>::new());
        let (panel, _rx) = PanelSender::channel();
        let mut session = ChatSession::new(None);

        let reply = session.send_user_turn(&transport, "m", "hi", "", &panel).await.unwrap();
        assert_eq!(reply, EMPTY_RESPONSE_PLACEHOLDER);
        assert_eq!(session.history()[1], ChatMessage::assistant(EMPTY_RESPONSE_PLACEHOLDER));
    }

    #[tokio::test]
    async fn test_failed_stream_commits_nothing() {
        let transport = ScriptedTransport::new().reply_then_fail(["partial"], 502);
        let (panel, mut rx) = PanelSender::channel();
        let mut session = ChatSession::new(None);

        let err = session.send_user_turn(&transport, "m", "hi", "", &panel).await.unwrap_err();
        assert!(matches!(err, SessionError::Transport(TransportError::Status { status: 502, .. })));
        assert_eq!(session.history(), [ChatMessage::user("hi")]);
        assert_eq!(session.last_response(), None);
        assert_eq!(session.state(), TurnState::Idle);

        let messages = drain(&mut rx);
        assert!(matches!(messages.last(), Some(PanelMessage::Error { text }) if text.contains("502")));
        assert!(!messages.contains(&PanelMessage::AssistantEnd));
    }

    #[tokio::test]
    async fn test_rejected_request_keeps_user_turn() {
        let transport = ScriptedTransport::new().fail(401);
        let (panel, _rx) = PanelSender::channel();
        let mut session = ChatSession::new(None);

        assert!(session.send_user_turn(&transport, "m", "hi", "", &panel).await.is_err());
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_second_turn() {
        let transport = ScriptedTransport::new().reply(["unused"]);
        let (panel, mut rx) = PanelSender::channel();
        let mut session = ChatSession::new(None);
        session.begin_turn("first").unwrap();

        let err = session.send_user_turn(&transport, "m", "second", "", &panel).await.unwrap_err();
        assert!(matches!(err, SessionError::Busy));
        assert_eq!(session.history(), [ChatMessage::user("first")]);
        assert!(drain(&mut rx).is_empty());

        session.cancel_turn();
        assert_eq!(session.state(), TurnState::Idle);
        assert_eq!(session.history().len(), 1);
    }
}
