use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use engram_core::prompts::PromptSet;
use engram_core::EngramConfig;

mod app;

const EXIT_CONFIG: i32 = 2;
const EXIT_DEPENDENCY: i32 = 3;
const EXIT_SIGINT: i32 = 130;
const EXIT_SIGTERM: i32 = 143;

/// WhatsApp ↔ LLM relay with two-tier conversational memory.
#[derive(Parser)]
#[command(name = "engram-gateway", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, default_value = "engram.toml")]
    config: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "engram=info,engram_gateway=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = match EngramConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };
    let prompts = match PromptSet::load(&config) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            error!("configuration error: {e}");
            std::process::exit(EXIT_CONFIG);
        }
    };

    let app = match app::App::build(&config, prompts) {
        Ok(app) => app,
        Err(e) => {
            error!("dependency unavailable at startup: {e}");
            std::process::exit(EXIT_DEPENDENCY);
        }
    };

    // Orphan recovery must finish before any inbound traffic is served.
    let recovered = app.lifecycle.recover_orphans().await;
    if recovered > 0 {
        info!(sessions = recovered, "orphaned sessions recovered");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let lifecycle_task = tokio::spawn(Arc::clone(&app.lifecycle).run(shutdown_rx.clone()));
    let poll_task = tokio::spawn(Arc::clone(&app.poll).run(shutdown_rx));

    info!("engram gateway running");
    let exit_code = wait_for_signal().await;

    info!("signal received, shutting down");
    let _ = shutdown_tx.send(true);
    let _ = lifecycle_task.await;
    let _ = poll_task.await;

    std::process::exit(exit_code);
}

async fn wait_for_signal() -> i32 {
    use tokio::signal::unix::{signal, SignalKind};
    let mut terminate =
        signal(SignalKind::terminate()).expect("installing SIGTERM handler cannot fail");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => EXIT_SIGINT,
        _ = terminate.recv() => EXIT_SIGTERM,
    }
}
