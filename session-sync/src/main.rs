//! Session Sync - Main entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use session_sync::{
    config::Config, cycle::CycleOutcome, daemon::shutdown::ShutdownCoordinator, utils,
    SessionEngine, SessionStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Restore the session directory from the store
    Restore,
    /// Back up the session directory once
    Backup,
    /// Restore, then back up periodically until interrupted
    Watch,
    /// Delete the remote record and the local session directory
    Disconnect,
    /// Show the remote record and local directory
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    let log_level = args.log_level.as_deref().unwrap_or(&config.log.level);
    utils::logger::init(log_level)?;

    let options = config.session_options()?;
    let store: Arc<dyn SessionStore> = Arc::new(config.build_store()?);
    let engine = SessionEngine::builder(options).store(store).build()?;

    tracing::info!(
        "Starting session-sync v{} (session: {})",
        env!("CARGO_PKG_VERSION"),
        engine.layout().record_key()
    );

    match args.command {
        Command::Restore => {
            let found = engine.start().await?;
            println!(
                "{} {}",
                if found { "Restored" } else { "Created empty" },
                engine.session_dir().display()
            );
        }
        Command::Backup => match engine.sync_now().await? {
            CycleOutcome::Stored { bytes, created } => {
                println!("{} remote session ({} bytes)", if created { "Created" } else { "Updated" }, bytes);
            }
            CycleOutcome::Skipped => println!("No session at {}", engine.session_dir().display()),
            CycleOutcome::Dropped => println!("A backup is already running"),
        },
        Command::Watch => watch(&engine).await?,
        Command::Disconnect => {
            let deleted = engine.disconnect().await?;
            println!("Deleted {} remote record(s)", deleted);
        }
        Command::Status => {
            let status = serde_json::json!({
                "sessionDir": engine.session_dir(),
                "localPresent": engine.session_dir().is_dir(),
                "remote": engine.remote_record().await?,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

async fn watch(engine: &SessionEngine) -> Result<()> {
    let shutdown = ShutdownCoordinator::new();
    let token = shutdown.token();

    let mut events = engine.subscribe();
    let event_logger = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => tracing::info!(event = %json, "Session event"),
                        Err(e) => tracing::warn!(error = %e, "Unserializable event"),
                    },
                    Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "Event log lagging"),
                    Err(RecvError::Closed) => break,
                },
            }
        }
    });

    engine.start().await?;
    engine.on_authenticated().await?;

    shutdown.wait_for_signal().await;
    engine.destroy().await;
    let _ = event_logger.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
