//! Main entrypoint for the tandem practice client.
//!
//! Loads configuration, opens a session with the configured tutor and
//! streams until the conversation ends or Ctrl+C is pressed.

use anyhow::Context;
use clap::Parser;
use gemini_realtime::{GeminiConfig, GeminiTransport};
use std::{path::PathBuf, sync::Arc};
use tandem_core::SessionController;
use tandem_service::{
    config::Config, devices::CpalDevices, display::TerminalDisplay, language::Language,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Practice speaking a language with a live AI tutor")]
struct Cli {
    /// Language to practice. Overrides PRACTICE_LANGUAGE.
    #[arg(short, long, value_enum)]
    language: Option<Language>,

    /// Prebuilt voice for the tutor. Overrides VOICE_NAME.
    #[arg(long)]
    voice: Option<String>,

    /// File with a custom persona instruction. Overrides INSTRUCTION_PATH.
    #[arg(long)]
    instruction: Option<PathBuf>,
}

/// Resolves when the user presses Ctrl+C.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Ending the session...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // --- 1. Load Configuration ---
    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(language) = cli.language {
        config.language = language;
    }
    if let Some(voice) = cli.voice {
        config.voice_name = Some(voice);
    }
    if let Some(path) = cli.instruction {
        config.instruction_path = Some(path);
    }

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    let session_config = config
        .session_config()
        .context("Failed to prepare the session")?;
    info!(
        language = %config.language,
        voice = %session_config.voice,
        model = %config.gemini_model,
        "Configuration loaded."
    );

    // --- 3. Wire the Session ---
    let display = Arc::new(TerminalDisplay::new(
        config.language.tutor(),
        std::io::stdout(),
    ));
    let transport = GeminiTransport::new(
        GeminiConfig::new(config.gemini_api_key.clone()).with_model(config.gemini_model.clone()),
    );
    let mut controller = SessionController::new(
        Arc::new(transport),
        Arc::new(CpalDevices),
        display.clone(),
        session_config,
    );

    // --- 4. Converse ---
    display.notice(config.language.greeting());
    controller
        .connect()
        .await
        .context("Failed to start the practice session")?;
    let outcome = controller.run(shutdown_signal()).await;

    display.print_transcript();
    outcome.context("The practice session ended with an error")?;
    info!("Session finished.");
    Ok(())
}
