//! Main entry point for MAIIDE.
//!
//! Without a subcommand this starts the chat TUI and restores the terminal
//! on exit. `ask`, `models` and `check-update` are line-oriented and never
//! touch the alternate screen.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use maiide::actions::{ActionDispatcher, EditorHost, LocalHost, StdioPrompter};
use maiide::ai::prompt;
use maiide::ai::{ChatSession, ChatTransport, OpenRouterClient};
use maiide::app::App;
use maiide::cli::{Args, Command};
use maiide::config::{self, Settings};
use maiide::event::{PanelMessage, PanelSender};
use maiide::shell::{OutputSink, ShellTerminal};
use maiide::updater::{CURRENT_VERSION, UpdateChecker};
use maiide::utils::guard::ExitGuard;
use maiide::utils::logger::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_dir = args.config.clone().unwrap_or_else(config::config_dir);
    init_logging(&config_dir.join("logs"));

    let settings_path = config::settings_path(&config_dir);
    let settings = config::load(&settings_path)?;
    let root = std::env::current_dir().context("Failed to read the current directory")?;
    info!(config = %config_dir.display(), command = ?args.command, "Starting");

    match args.command.clone().unwrap_or(Command::Chat) {
        Command::Chat => run_tui(settings, settings_path, root, &args).await,
        Command::Ask { model, prompt } => {
            ask(settings, &settings_path, root, &args, model.as_deref(), &prompt.join(" ")).await
        }
        Command::Models => list_models(&settings, &settings_path).await,
        Command::CheckUpdate => check_update().await,
    }
}

async fn run_tui(settings: Settings, settings_path: PathBuf, root: PathBuf, args: &Args) -> Result<()> {
    let mut terminal = ratatui::init();
    // Restores on normal exit and while a panic unwinds.
    let _restore = ExitGuard::new(ratatui::restore);

    let mut app = App::new(settings, settings_path, root, args.active_file());
    app.run(&mut terminal).await
}

fn client(settings: &Settings, settings_path: &Path) -> Result<OpenRouterClient> {
    let api_key = settings.resolve_api_key(settings_path)?;
    Ok(OpenRouterClient::new(api_key)?
        .with_base_url(settings.base_url.clone())
        .with_idle_timeout(settings.stream_idle_timeout()))
}

/// One turn: stream the reply to stdout, then offer its actions on stdin.
async fn ask(
    settings: Settings,
    settings_path: &Path,
    root: PathBuf,
    args: &Args,
    model: Option<&str>,
    text: &str,
) -> Result<()> {
    let client = client(&settings, settings_path)?;
    let host = LocalHost::new(StdioPrompter, root, ShellTerminal::new(OutputSink::Inherit))
        .with_active_file(args.active_file());
    let snapshot = host.editor_snapshot().await?;
    let context = prompt::build_context_augment(snapshot.as_ref(), &settings.context);
    let model = settings.chat_model(model);

    let (panel, mut messages) = PanelSender::channel();
    let printer = tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(message) = messages.recv().await {
            let written = match message {
                PanelMessage::AssistantDelta { text } => write!(stdout, "{text}").and_then(|()| stdout.flush()),
                PanelMessage::AssistantEnd => writeln!(stdout),
                PanelMessage::Error { text } => {
                    eprintln!("{text}");
                    Ok(())
                }
                _ => Ok(()),
            };
            if let Err(e) = written {
                warn!("Failed to write reply: {}", e);
                break;
            }
        }
    });

    let mut session = ChatSession::new(settings.system_prompt());
    let reply = tokio::select! {
        reply = session.send_user_turn(&client, &model, text, &context, &panel) => Some(reply),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl+C")?;
            None
        }
    };
    drop(panel);
    if let Err(e) = printer.await {
        warn!("Reply printer failed: {}", e);
    }

    let reply = match reply {
        Some(reply) => reply?,
        None => {
            session.cancel_turn();
            eprintln!("\nCancelled.");
            return Ok(());
        }
    };

    let outcomes = ActionDispatcher::new(settings.agent_actions.clone())
        .dispatch(&host, &reply)
        .await;
    info!(count = outcomes.len(), "Reply actions handled");
    Ok(())
}

async fn list_models(settings: &Settings, settings_path: &Path) -> Result<()> {
    let client = client(settings, settings_path)?;
    let models = client.list_models().await?;
    let default_model = settings.default_model(&models);
    for model in &models {
        let marker = if Some(&model.id) == default_model.as_ref() { "*" } else { " " };
        match &model.name {
            Some(name) => println!("{marker} {}\t{}", model.id, name),
            None => println!("{marker} {}", model.id),
        }
    }
    if models.is_empty() {
        eprintln!("No models returned.");
    }
    Ok(())
}

async fn check_update() -> Result<()> {
    let checker = UpdateChecker::new()?;
    match checker.check(CURRENT_VERSION).await.context("Update check failed")? {
        Some(release) => println!("MAIIDE {} is available: {}", release.tag_name, release.page_url()),
        None => println!("MAIIDE {CURRENT_VERSION} is up to date."),
    }
    Ok(())
}
