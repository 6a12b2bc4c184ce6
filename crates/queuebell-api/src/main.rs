//! QueueBell API server binary.
//!
//! Start the server with:
//! ```bash
//! TELEGRAM_BOT_TOKEN=xxx FIREBASE_DB_URL=https://... cargo run -p queuebell-api
//! ```

use clap::Parser;
use queuebell_api::{serve, AppState};
use queuebell_core::{config, Config};
use tracing_subscriber::EnvFilter;

/// QueueBell API server - queue notifications over Telegram
#[derive(Parser, Debug)]
#[command(name = "queuebell-server")]
#[command(about = "HTTP API for QueueBell: provisioning, Telegram linking and call notifications")]
struct Args {
    /// Host to bind (overrides QUEUEBELL_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides QUEUEBELL_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Verbose logging (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    config::load_env_files();

    // Initialize logging based on verbosity
    let filter = match args.verbose {
        0 => "queuebell=info,queuebell_api=info,queuebell_notifier=info,queuebell_telegram=info,tower_http=warn",
        1 => "queuebell=debug,queuebell_api=debug,queuebell_notifier=debug,queuebell_telegram=debug,queuebell_persistence=debug",
        2 => "queuebell=trace,queuebell_api=trace,queuebell_notifier=trace,queuebell_telegram=trace,queuebell_persistence=trace,tower_http=debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut settings = Config::from_env()?;
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    tracing::debug!(config = ?settings, "Configuration loaded");

    let state = AppState::from_config(&settings)?;
    let api_config = state.config.as_ref().clone();
    tracing::info!(
        database = state.database,
        tickets = state.notifier.ticket_backend(),
        telegram = state.telegram.is_some(),
        "QueueBell server starting"
    );

    serve(api_config, state).await?;
    Ok(())
}
