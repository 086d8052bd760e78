//! The single chat panel and the task that serves it.
//!
//! At most one panel exists at a time. [`PanelManager`] owns it: opening
//! again reveals the existing panel, closing aborts its worker (and any
//! reply still streaming). The worker owns the [`ChatSession`] and handles
//! [`PanelRequest`]s one at a time, so a reply, its follow-up actions and
//! the next request never interleave.

use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::actions::{ActionDispatcher, EditorHost};
use crate::config::Settings;
use crate::event::{PanelMessage, PanelRequest, PanelSender};

use super::client::ChatTransport;
use super::prompt;
use super::session::{ChatSession, SessionError, TurnState};

/// Cheap, cloneable access to the open panel's worker.
#[derive(Debug, Clone)]
pub struct PanelHandle {
    requests: UnboundedSender<PanelRequest>,
    gate: Arc<watch::Sender<TurnState>>,
}

impl PanelHandle {
    /// Queue a chat turn. Fails with [`SessionError::Busy`] while the
    /// previous turn (including its actions) is still running.
    pub fn send_chat(&self, model: Option<String>, text: String) -> Result<(), SessionError> {
        let acquired = self.gate.send_if_modified(|state| match state {
            TurnState::Idle => {
                *state = TurnState::Streaming;
                true
            }
            TurnState::Streaming => false,
        });
        if !acquired {
            return Err(SessionError::Busy);
        }
        if self.requests.send(PanelRequest::Chat { model, text }).is_err() {
            self.gate.send_replace(TurnState::Idle);
            return Err(SessionError::PanelClosed);
        }
        Ok(())
    }

    /// Queue any request; chat requests go through the turn gate.
    pub fn request(&self, request: PanelRequest) -> Result<(), SessionError> {
        match request {
            PanelRequest::Chat { model, text } => self.send_chat(model, text),
            other => self
                .requests
                .send(other)
                .map_err(|_| SessionError::PanelClosed),
        }
    }

    pub fn state(&self) -> TurnState {
        *self.gate.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TurnState> {
        self.gate.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.requests.is_closed()
    }

    pub fn same_panel(&self, other: &PanelHandle) -> bool {
        self.requests.same_channel(&other.requests)
    }
}

struct OpenPanel {
    handle: PanelHandle,
    worker: JoinHandle<()>,
}

pub struct PanelManager<T: ?Sized, H: ?Sized> {
    transport: Arc<T>,
    host: Arc<H>,
    settings: Settings,
    open: Option<OpenPanel>,
}

impl<T, H> PanelManager<T, H>
where
    T: ChatTransport + ?Sized + 'static,
    H: EditorHost + ?Sized + 'static,
{
    pub fn new(transport: Arc<T>, host: Arc<H>, settings: Settings) -> Self {
        Self {
            transport,
            host,
            settings,
            open: None,
        }
    }

    /// Return the open panel, or open one. The message receiver is only
    /// returned for a newly opened panel.
    pub fn open_or_reveal(&mut self) -> (PanelHandle, Option<UnboundedReceiver<PanelMessage>>) {
        if let Some(open) = &self.open {
            if !open.worker.is_finished() {
                debug!("Revealing existing chat panel");
                return (open.handle.clone(), None);
            }
        }

        let (requests, request_rx) = mpsc::unbounded_channel();
        let (panel, messages) = PanelSender::channel();
        let gate = Arc::new(watch::Sender::new(TurnState::Idle));
        let worker = SessionWorker {
            session: ChatSession::new(self.settings.system_prompt()),
            dispatcher: ActionDispatcher::new(self.settings.agent_actions.clone()),
            transport: self.transport.clone(),
            host: self.host.clone(),
            settings: self.settings.clone(),
            panel,
            gate: gate.clone(),
        };
        let worker = tokio::spawn(worker.run(request_rx));
        info!("Opened chat panel");

        let handle = PanelHandle { requests, gate };
        self.open = Some(OpenPanel {
            handle: handle.clone(),
            worker,
        });
        (handle, Some(messages))
    }
}

impl<T: ?Sized, H: ?Sized> PanelManager<T, H> {
    pub fn handle(&self) -> Option<&PanelHandle> {
        self.open.as_ref().map(|open| &open.handle)
    }

    /// Abort the worker, including a reply still streaming.
    pub fn close(&mut self) {
        if let Some(open) = self.open.take() {
            open.worker.abort();
            info!("Closed chat panel");
        }
    }
}

impl<T: ?Sized, H: ?Sized> Drop for PanelManager<T, H> {
    fn drop(&mut self) {
        self.close();
    }
}

struct SessionWorker<T: ?Sized, H: ?Sized> {
    session: ChatSession,
    dispatcher: ActionDispatcher,
    transport: Arc<T>,
    host: Arc<H>,
    settings: Settings,
    panel: PanelSender,
    gate: Arc<watch::Sender<TurnState>>,
}

impl<T, H> SessionWorker<T, H>
where
    T: ChatTransport + ?Sized,
    H: EditorHost + ?Sized,
{
    async fn run(mut self, mut requests: UnboundedReceiver<PanelRequest>) {
        self.post_models().await;
        while let Some(request) = requests.recv().await {
            debug!(?request, "Panel request");
            match request {
                PanelRequest::Chat { model, text } => {
                    self.chat(model.as_deref(), &text).await;
                    self.gate.send_replace(TurnState::Idle);
                }
                PanelRequest::RefreshModels => self.post_models().await,
                PanelRequest::ChatWithSelection => self.prefill_selection().await,
                PanelRequest::InsertLastResponse => self.insert_last_response().await,
                PanelRequest::NewFileFromLastResponse => self.new_file_from_last_response().await,
                PanelRequest::ReplaceFileWithLastResponse => self.replace_file_with_last_response().await,
                PanelRequest::RunTerminalCommand => self.run_terminal_command().await,
            }
        }
        debug!("Panel request channel closed; worker exiting");
    }

    async fn post_models(&self) {
        match self.transport.list_models().await {
            Ok(models) => {
                let default_model = self.settings.default_model(&models);
                info!(count = models.len(), ?default_model, "Listed models");
                self.panel.post(PanelMessage::Models { models, default_model });
            }
            Err(e) => {
                warn!(error = %e, "Failed to list models");
                self.panel.post(PanelMessage::Error { text: e.to_string() });
            }
        }
    }

    async fn chat(&mut self, model: Option<&str>, text: &str) {
        let model = self.settings.chat_model(model);
        let snapshot = match self.host.editor_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to read active editor for context: {:#}", e);
                None
            }
        };
        let context = prompt::build_context_augment(snapshot.as_ref(), &self.settings.context);

        let reply = self
            .session
            .send_user_turn(&*self.transport, &model, text, &context, &self.panel)
            .await;
        if let Ok(reply) = reply {
            self.dispatcher.dispatch(&*self.host, &reply).await;
        }
    }

    async fn prefill_selection(&self) {
        let selection = match self.host.editor_snapshot().await {
            Ok(snapshot) => snapshot.and_then(|s| s.selection).unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read selection: {:#}", e);
                String::new()
            }
        };
        self.panel.post(PanelMessage::Prefill { text: selection });
    }

    fn last_response(&self) -> Option<String> {
        self.session.last_response().map(str::to_string)
    }

    async fn insert_last_response(&self) {
        let Some(text) = self.last_response() else {
            return self.host.notify("No assistant response to insert.").await;
        };
        match self.host.insert_at_cursor(&text).await {
            Ok(true) => {}
            Ok(false) => self.host.notify("No active editor.").await,
            Err(e) => self.host.notify(&format!("{e:#}")).await,
        }
    }

    async fn new_file_from_last_response(&self) {
        let Some(text) = self.last_response() else {
            return self.host.notify("No assistant response to create file from.").await;
        };
        let Some(path) = self
            .host
            .ask_input("Enter file path", None)
            .await
            .filter(|p| !p.trim().is_empty())
        else {
            return;
        };
        let result = match self.host.write_file(path.trim(), &text).await {
            Ok(written) => self.host.open_file(&written).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            self.host.notify(&format!("{e:#}")).await;
        }
    }

    async fn replace_file_with_last_response(&self) {
        let Some(text) = self.last_response() else {
            return self.host.notify("No assistant response to apply.").await;
        };
        if !matches!(self.host.editor_snapshot().await, Ok(Some(_))) {
            return self.host.notify("No active editor.").await;
        }
        if !self
            .host
            .confirm("Replace entire file with the last assistant response?", "Replace")
            .await
        {
            return;
        }
        if let Err(e) = self.host.replace_active_file(&text).await {
            self.host.notify(&format!("{e:#}")).await;
        }
    }

    async fn run_terminal_command(&self) {
        let Some(command) = self
            .host
            .ask_input("Enter command to run", None)
            .await
            .filter(|c| !c.trim().is_empty())
        else {
            return;
        };
        if let Err(e) = self.host.run_in_terminal(&command).await {
            self.host.notify(&format!("{e:#}")).await;
        }
    }
}
