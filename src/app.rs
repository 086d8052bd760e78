//! Application state for the TUI.
//!
//! `App` owns the chat view, the shell output pane, the single chat panel
//! and whatever modal is currently asking the user something. Background
//! tasks (the panel worker, the shell, the update check) talk to it only
//! through channels.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::DefaultTerminal;
use tokio::sync::mpsc::{Receiver, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::actions::{ChannelPrompter, LocalHost};
use crate::ai::client::OpenRouterClient;
use crate::ai::panel::{PanelHandle, PanelManager};
use crate::config::{self, Settings};
use crate::editor::ActiveFile;
use crate::event::{self, AppEvent, PanelMessage, PanelRequest, UserEvent, init_app_eventsource, init_user_event};
use crate::shell::{OutputSink, ShellTerminal};
use crate::ui::chat::ChatView;
use crate::ui::terminal::TuiTerminal;
use crate::updater::{CURRENT_VERSION, UpdateChecker};

pub type TuiHost = LocalHost<ChannelPrompter>;

/// What a text input modal is collecting.
#[derive(Debug)]
pub enum InputPurpose {
    /// Answer to a prompt from the panel worker.
    Reply(oneshot::Sender<Option<String>>),
    ApiKey,
    ModelFilter,
}

#[derive(Debug)]
pub enum Modal {
    Confirm {
        question: String,
        accept: String,
        reply: oneshot::Sender<bool>,
    },
    Input {
        prompt: String,
        value: String,
        masked: bool,
        purpose: InputPurpose,
    },
}

impl Modal {
    fn input(prompt: impl Into<String>, value: impl Into<String>, purpose: InputPurpose) -> Self {
        let masked = matches!(purpose, InputPurpose::ApiKey);
        Modal::Input {
            prompt: prompt.into(),
            value: value.into(),
            masked,
            purpose,
        }
    }

    /// Answer "no" / dismiss, so a waiting task is released.
    fn dismiss(self) {
        match self {
            Modal::Confirm { reply, .. } => answer(reply, false),
            Modal::Input { purpose: InputPurpose::Reply(reply), .. } => answer(reply, None),
            Modal::Input { .. } => {}
        }
    }
}

fn answer<T: std::fmt::Debug>(reply: oneshot::Sender<T>, value: T) {
    if let Err(value) = reply.send(value) {
        debug!(?value, "Prompt requester is gone");
    }
}

pub struct App {
    settings: Settings,
    settings_path: PathBuf,
    host: Arc<TuiHost>,
    panels: Option<PanelManager<OpenRouterClient, TuiHost>>,
    panel: Option<PanelHandle>,
    panel_messages: Option<UnboundedReceiver<PanelMessage>>,

    // frontend widgets, read by the ui module
    pub(crate) chat: ChatView,
    pub(crate) tui_terminal: TuiTerminal,
    modals: VecDeque<Modal>,

    exit: bool,
    command_mode: bool,
    force_redraw_flag: bool,

    user_events: Receiver<std::io::Result<UserEvent>>,
    app_events: UnboundedReceiver<AppEvent>,
    event_sink: UnboundedSender<AppEvent>,
}

impl App {
    /// `root` is where relative paths from replies are resolved.
    pub fn new(
        settings: Settings,
        settings_path: PathBuf,
        root: PathBuf,
        active_file: Option<ActiveFile>,
    ) -> Self {
        let (event_sink, app_events) = init_app_eventsource();
        let terminal = ShellTerminal::new(OutputSink::Events(event_sink.clone()));
        let host = LocalHost::new(ChannelPrompter::new(event_sink.clone()), root, terminal)
            .with_active_file(active_file);

        Self {
            settings,
            settings_path,
            host: Arc::new(host),
            panels: None,
            panel: None,
            panel_messages: None,
            chat: ChatView::new(),
            tui_terminal: TuiTerminal::new(),
            modals: VecDeque::new(),
            exit: false,
            command_mode: false,
            force_redraw_flag: false,
            user_events: init_user_event(),
            app_events,
            event_sink,
        }
    }

    pub fn get_command_mode(&self) -> bool {
        self.command_mode
    }

    pub fn set_command_mode(&mut self, flag: bool) {
        self.command_mode = flag;
    }

    pub(crate) fn modal(&self) -> Option<&Modal> {
        self.modals.front()
    }

    pub(crate) fn panel_open(&self) -> bool {
        self.panel.is_some()
    }

    /// Build the transport and open (or reveal) the chat panel.
    ///
    /// Without a credential, leaves a notice and asks for a key instead.
    fn open_panel(&mut self) {
        if self.panels.is_none() {
            let api_key = match self.settings.resolve_api_key(&self.settings_path) {
                Ok(key) => key,
                Err(e) => {
                    warn!("{}", e);
                    self.chat.push_notice(e.to_string());
                    self.prompt_api_key();
                    return;
                }
            };
            let client = match OpenRouterClient::new(api_key) {
                Ok(client) => client
                    .with_base_url(self.settings.base_url.clone())
                    .with_idle_timeout(self.settings.stream_idle_timeout()),
                Err(e) => {
                    warn!("Failed to build HTTP client: {}", e);
                    self.chat.push_notice(format!("Failed to start chat: {e}"));
                    return;
                }
            };
            self.panels = Some(PanelManager::new(
                Arc::new(client),
                self.host.clone(),
                self.settings.clone(),
            ));
        }

        if let Some(panels) = self.panels.as_mut() {
            let (handle, messages) = panels.open_or_reveal();
            if let Some(messages) = messages {
                self.panel_messages = Some(messages);
            }
            self.panel = Some(handle);
        }
    }

    fn close_panel(&mut self) {
        if let Some(panels) = self.panels.as_mut() {
            panels.close();
        }
        self.panel = None;
        self.panel_messages = None;
    }

    /// Drop the current client so the next open picks up new settings.
    fn reconnect(&mut self) {
        self.close_panel();
        self.panels = None;
        self.open_panel();
    }

    fn prompt_api_key(&mut self) {
        self.modals
            .push_back(Modal::input("OpenRouter API key", "", InputPurpose::ApiKey));
    }

    fn save_api_key(&mut self, key: &str) {
        self.settings.api_key = Some(key.to_string());
        match config::save(&self.settings_path, &self.settings) {
            Ok(()) => {
                self.chat.push_notice("OpenRouter API key saved to settings.");
                self.reconnect();
            }
            Err(e) => {
                warn!("{}", e);
                self.chat.push_notice(format!("Failed to save API key: {e}"));
            }
        }
    }

    fn panel_request(&mut self, request: PanelRequest) {
        let Some(panel) = self.panel.as_ref() else {
            self.chat
                .push_notice("Chat panel is closed. Press Ctrl+B then o to open it.");
            return;
        };
        if let Err(e) = panel.request(request) {
            warn!("Panel request failed: {}", e);
            self.chat.push_notice(e.to_string());
        }
    }

    fn spawn_update_check(&self) {
        let sink = self.event_sink.clone();
        tokio::spawn(async move {
            let checker = match UpdateChecker::new() {
                Ok(checker) => checker,
                Err(e) => {
                    debug!("Update check unavailable: {}", e);
                    return;
                }
            };
            match checker.check(CURRENT_VERSION).await {
                Ok(Some(release)) => {
                    let event = AppEvent::UpdateAvailable {
                        url: release.page_url(),
                        version: release.tag_name,
                    };
                    if sink.send(event).is_err() {
                        debug!("UI closed before the update check finished");
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Update check failed: {}", e),
            }
        });
    }

    pub async fn run(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        if self.settings.check_for_updates {
            self.spawn_update_check();
        }
        self.open_panel();
        self.draw(terminal)?;

        loop {
            if self.exit {
                self.close_panel();
                info!("Exiting");
                break Ok(());
            }
            tokio::select! {
                res = self.user_events.recv() => {
                    let usr_evt = res.with_context(|| anyhow::anyhow!("User event stream is ended."))?;
                    self.handle_user_event(usr_evt?)?;
                }
                res = self.app_events.recv() => {
                    let app_evt = res.with_context(|| anyhow::anyhow!("App event stream is ended"))?;
                    self.handle_app_event(app_evt);
                }
                msg = recv_panel(&mut self.panel_messages) => match msg {
                    Some(msg) => self.chat.apply(msg),
                    None => {
                        debug!("Panel message channel closed");
                        self.panel_messages = None;
                    }
                },
            }
            if self.force_redraw_flag {
                self.force_redraw_flag = false;
                terminal.clear()?;
            }
            self.draw(terminal)?;
        }
    }

    pub fn draw(&self, terminal: &mut DefaultTerminal) -> Result<()> {
        let mut cursor = None;
        terminal.draw(|frame| {
            let area = frame.area();
            use ratatui::widgets::Widget;
            self.render(area, frame.buffer_mut());
            cursor = crate::ui::input_cursor(self, area);
        })?;

        match cursor {
            Some(position) => {
                terminal.show_cursor()?;
                terminal.set_cursor_position(position)?;
            }
            None => terminal.hide_cursor()?,
        }
        Ok(())
    }
}

/// Next message from the open panel; pending forever when none is open.
async fn recv_panel(messages: &mut Option<UnboundedReceiver<PanelMessage>>) -> Option<PanelMessage> {
    match messages {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl App {
    fn handle_user_event(&mut self, event: UserEvent) -> Result<()> {
        let UserEvent::Key(key_evt) = event else {
            return Ok(());
        };
        if !matches!(key_evt.kind, KeyEventKind::Press) {
            return Ok(());
        }

        if !self.modals.is_empty() {
            self.handle_modal_key(key_evt);
            return Ok(());
        }

        if self.command_mode {
            self.handle_command_mode_key(key_evt);
            return Ok(());
        }

        // Ctrl + B => Command Mode
        if key_evt.modifiers.contains(KeyModifiers::CONTROL)
            && matches!(key_evt.code, KeyCode::Char('b') | KeyCode::Char('B'))
        {
            self.set_command_mode(true);
            return Ok(());
        }
        if key_evt.modifiers.contains(KeyModifiers::CONTROL) && matches!(key_evt.code, KeyCode::Char('c')) {
            self.exit = true;
            return Ok(());
        }

        event::chat::handle_key_event(&mut self.chat, self.panel.as_ref(), key_evt)
    }

    fn handle_command_mode_key(&mut self, key_evt: KeyEvent) {
        self.set_command_mode(false);
        let KeyCode::Char(c) = key_evt.code else {
            return;
        };
        match c.to_ascii_lowercase() {
            'q' => self.exit = true,
            'l' => self.force_redraw_flag = true,
            'm' => self.chat.cycle_model(1),
            'f' => {
                let current = self.chat.model_filter().to_string();
                self.modals
                    .push_back(Modal::input("Filter models", current, InputPurpose::ModelFilter));
            }
            'r' => self.panel_request(PanelRequest::RefreshModels),
            's' => self.panel_request(PanelRequest::ChatWithSelection),
            'i' => self.panel_request(PanelRequest::InsertLastResponse),
            'n' => self.panel_request(PanelRequest::NewFileFromLastResponse),
            'e' => self.panel_request(PanelRequest::ReplaceFileWithLastResponse),
            't' => self.panel_request(PanelRequest::RunTerminalCommand),
            'k' => self.prompt_api_key(),
            'o' => self.open_panel(),
            'c' => {
                self.close_panel();
                self.chat.push_notice("Chat panel closed.");
            }
            other => debug!(key = %other, "Unbound command key"),
        }
    }

    fn handle_modal_key(&mut self, key_evt: KeyEvent) {
        let Some(modal) = self.modals.front_mut() else {
            return;
        };
        match modal {
            Modal::Confirm { .. } => {
                let accepted = match key_evt.code {
                    KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => true,
                    KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => false,
                    _ => return,
                };
                if let Some(Modal::Confirm { reply, .. }) = self.modals.pop_front() {
                    answer(reply, accepted);
                }
            }
            Modal::Input { value, .. } => match key_evt.code {
                KeyCode::Char(c) => value.push(c),
                KeyCode::Backspace => {
                    value.pop();
                }
                KeyCode::Esc => {
                    if let Some(modal) = self.modals.pop_front() {
                        modal.dismiss();
                    }
                }
                KeyCode::Enter => {
                    if let Some(Modal::Input { value, purpose, .. }) = self.modals.pop_front() {
                        self.submit_input(value, purpose);
                    }
                }
                _ => {}
            },
        }
    }

    fn submit_input(&mut self, value: String, purpose: InputPurpose) {
        match purpose {
            InputPurpose::Reply(reply) => {
                let value = (!value.trim().is_empty()).then_some(value);
                answer(reply, value);
            }
            InputPurpose::ApiKey => {
                let key = value.trim();
                if key.is_empty() {
                    self.chat.push_notice("No API key entered.");
                } else {
                    self.save_api_key(key);
                }
            }
            InputPurpose::ModelFilter => self.chat.set_model_filter(value),
        }
    }

    fn handle_app_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Confirm { question, accept, reply } => {
                self.modals.push_back(Modal::Confirm { question, accept, reply });
            }
            AppEvent::Input { prompt, default, reply } => {
                self.modals.push_back(Modal::input(
                    prompt,
                    default.unwrap_or_default(),
                    InputPurpose::Reply(reply),
                ));
            }
            AppEvent::Notice { message } => self.chat.push_notice(message),
            AppEvent::TerminalOutput { line } => self.tui_terminal.push_line(line),
            AppEvent::UpdateAvailable { version, url } => {
                self.chat
                    .push_notice(format!("MAIIDE {version} is available: {url}"));
            }
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        for modal in self.modals.drain(..) {
            modal.dismiss();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::chat::Speaker;

    fn app(dir: &std::path::Path) -> App {
        let settings = Settings {
            check_for_updates: false,
            ..Settings::default()
        };
        App::new(settings, config::settings_path(dir), dir.to_path_buf(), None)
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new_with_kind(code, KeyModifiers::NONE, KeyEventKind::Press)
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_user_event(UserEvent::Key(press(KeyCode::Char(c)))).unwrap();
        }
    }

    #[tokio::test]
    async fn test_confirm_modal_answers_requester() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let (reply, answer) = oneshot::channel();
        app.handle_app_event(AppEvent::Confirm {
            question: "Run command: ls?".into(),
            accept: "Run".into(),
            reply,
        });
        assert!(matches!(app.modal(), Some(Modal::Confirm { .. })));

        app.handle_user_event(UserEvent::Key(press(KeyCode::Char('y')))).unwrap();
        assert!(answer.await.unwrap());
        assert!(app.modal().is_none());
    }

    #[tokio::test]
    async fn test_input_modal_edits_default_and_empty_is_dismissal() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());

        let (reply, answer) = oneshot::channel();
        app.handle_app_event(AppEvent::Input {
            prompt: "Save rust code block as".into(),
            default: Some("index.rs".into()),
            reply,
        });
        app.handle_user_event(UserEvent::Key(press(KeyCode::Backspace))).unwrap();
        app.handle_user_event(UserEvent::Key(press(KeyCode::Backspace))).unwrap();
        type_text(&mut app, "txt");
        app.handle_user_event(UserEvent::Key(press(KeyCode::Enter))).unwrap();
        assert_eq!(answer.await.unwrap(), Some("index.txt".to_string()));

        let (reply, answer) = oneshot::channel();
        app.handle_app_event(AppEvent::Input { prompt: "Enter command to run".into(), default: None, reply });
        app.handle_user_event(UserEvent::Key(press(KeyCode::Enter))).unwrap();
        assert_eq!(answer.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_dropping_app_declines_pending_prompts() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        let (reply, answer) = oneshot::channel();
        app.handle_app_event(AppEvent::Confirm { question: "q".into(), accept: "Run".into(), reply });
        drop(app);
        assert!(!answer.await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_key_prompts_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.settings.base_url = "http://127.0.0.1:9".into();
        // An environment key would skip the prompt.
        if std::env::var(config::API_KEY_ENV).is_ok() {
            return;
        }

        app.open_panel();
        assert!(!app.panel_open());
        assert!(matches!(app.modal(), Some(Modal::Input { masked: true, .. })));

        type_text(&mut app, "sk-or-test");
        app.handle_user_event(UserEvent::Key(press(KeyCode::Enter))).unwrap();

        let saved = config::load(&config::settings_path(dir.path())).unwrap();
        assert_eq!(saved.api_key.as_deref(), Some("sk-or-test"));
        assert!(app.panel_open());
        assert!(
            app.chat
                .entries()
                .iter()
                .any(|e| e.speaker == Speaker::Notice && e.text == "OpenRouter API key saved to settings.")
        );
    }

    #[tokio::test]
    async fn test_command_mode_without_panel_leaves_notice() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.handle_user_event(UserEvent::Key(KeyEvent::new_with_kind(
            KeyCode::Char('b'),
            KeyModifiers::CONTROL,
            KeyEventKind::Press,
        )))
        .unwrap();
        assert!(app.get_command_mode());
        type_text(&mut app, "i");
        assert!(!app.get_command_mode());
        assert_eq!(app.chat.entries()[0].speaker, Speaker::Notice);

        type_text(&mut app, "x");
        assert_eq!(app.chat.input(), "x");
    }

    #[tokio::test]
    async fn test_app_events_reach_views() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = app(dir.path());
        app.handle_app_event(AppEvent::TerminalOutput { line: "hello".into() });
        app.handle_app_event(AppEvent::UpdateAvailable { version: "v9.0.0".into(), url: "https://x".into() });
        assert_eq!(app.tui_terminal.lines().collect::<Vec<_>>(), ["hello"]);
        assert_eq!(app.chat.entries()[0].text, "MAIIDE v9.0.0 is available: https://x");
    }
}
