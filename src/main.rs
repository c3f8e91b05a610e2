use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use clap::Parser;
use milo_core::{Mode, SessionOptions};

mod app;
mod config;
mod handler;
mod tui;
mod ui;

use app::{App, Launch};
use config::Config;
use tui::EventHandler;

#[derive(Parser)]
#[command(name = "milo")]
#[command(about = "Ask Milo: an AI tutor with Sweet, Savage and Nerdy personalities", version)]
struct Cli {
    /// Start straight in this mode (sweet, savage or nerdy)
    #[arg(short, long)]
    mode: Option<String>,
    /// Learner level named in every prompt, e.g. "5th grade"
    #[arg(short, long)]
    level: Option<String>,
    /// Gemini model id
    #[arg(long)]
    model: Option<String>,
    /// Don't send earlier messages along with each question
    #[arg(long)]
    no_history: bool,
    /// Log filter, e.g. "debug" or "milo_core=trace" (defaults to RUST_LOG, then info)
    #[arg(long)]
    log_level: Option<String>,
}

/// Log to a file; the terminal belongs to the TUI.
fn init_logging(filter: Option<&str>) -> Result<()> {
    let log_path = Config::log_path()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&log_path)?;

    let env_filter = match filter {
        Some(f) => tracing_subscriber::EnvFilter::try_new(f)?,
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_level.as_deref())?;
    tracing::info!("Starting Ask Milo v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Could not read config; using defaults");
        Config::new()
    });

    let mode = cli
        .mode
        .as_deref()
        .map(|m| Mode::from_str(m).ok_or_else(|| anyhow!("Unknown mode '{}': expected sweet, savage or nerdy", m)))
        .transpose()?;

    let mut options = SessionOptions {
        track_history: !cli.no_history,
        ..SessionOptions::default()
    };
    if let Some(level) = cli.level.or_else(|| config.level.clone()) {
        options.level = level;
    }

    let launch = Launch {
        mode,
        model: cli.model,
        options,
    };

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let mut app = App::new(config, launch, events.sender());

    let result = run(&mut terminal, &mut app, &mut events).await;
    app.shutdown();

    tui::restore()?;
    if let Err(e) = &result {
        tracing::error!(error = %e, "Exited with error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}
