//! encore: artist site backend
//!
//! Usage:
//!   encore            - Start the HTTP API (and the calendar sync when enabled)
//!   encore --resync   - Queue every calendar for sync, then start as usual
//!   encore --help     - Show help

use encore_api::AppState;
use encore_core::{Config, Store};
use encore_gcal::{Dispatcher, SyncHook};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Run mode
enum RunMode {
    Server { resync: bool },
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args();

    let resync = match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("encore {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server { resync } => resync,
    };

    // Load .env before reading RUST_LOG or any config variable
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    config.validate().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting encore...");

    let store = Store::open(&config.database.path)
        .map_err(|e| anyhow::anyhow!("Failed to open database: {}", e))?;

    run_server(config, store, resync).await
}

/// Parse command line arguments
fn parse_args() -> RunMode {
    let mut resync = false;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--help" | "-h" => return RunMode::Help,
            "--version" | "-v" => return RunMode::Version,
            "--resync" => resync = true,
            _ => {}
        }
    }

    RunMode::Server { resync }
}

/// Print help message
fn print_help() {
    println!("encore - artist site backend");
    println!();
    println!("Usage:");
    println!("  encore               Start the HTTP API and calendar sync");
    println!("  encore --resync      Queue every calendar for Google Calendar sync first");
    println!("  encore --help        Show this help message");
    println!("  encore --version     Show version");
    println!();
    println!("Configuration is read from ./encore.toml when present.");
    println!();
    println!("Environment Variables:");
    println!("  API_PORT             HTTP API port (default: 3000)");
    println!("  ADMIN_KEY            Bearer key for /api/admin (open when unset)");
    println!("  API_ALLOWED_ORIGINS  Comma-separated CORS origins (default: any)");
    println!("  DB_PATH              SQLite database path (default: data/encore.db)");
    println!("  GCAL_ENABLED         Push calendar changes to Google Calendar (default: false)");
    println!("  GCAL_CALENDAR_ID     Target calendar (default: primary)");
    println!("  GCAL_SERVICE_ACCOUNT Path to the service-account key file");
    println!("  SYNC_MAX_ATTEMPTS    Attempts before a sync job is parked (default: 8)");
    println!("  SYNC_POLL_INTERVAL_SECS  Dispatcher poll interval (default: 5)");
    println!("  RUST_LOG             Log filter (default: info)");
}

/// Run the HTTP API and, when enabled, the sync dispatcher
async fn run_server(config: Config, store: Store, resync: bool) -> anyhow::Result<()> {
    let dispatcher = if config.gcal.enabled {
        store
            .register_hook(Arc::new(SyncHook::new()))
            .map_err(|e| anyhow::anyhow!("Failed to register sync hook: {}", e))?;

        if resync {
            let queued = store.enqueue_all_calendars()?;
            tracing::info!("Queued {} sync jobs", queued);
        }

        let dispatcher = Dispatcher::from_config(store.clone(), &config)
            .map_err(|e| anyhow::anyhow!("Failed to start calendar sync: {}", e))?;
        tracing::info!("Google Calendar sync enabled for {}", config.gcal.calendar_id);
        Some(dispatcher.start())
    } else {
        if resync {
            tracing::warn!("--resync ignored: Google Calendar sync is disabled");
        }
        tracing::info!("Google Calendar sync disabled");
        None
    };

    let state = AppState::new(config, store);

    tracing::info!("encore initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
        tracing::info!("Shutting down...");
    };

    let result = encore_api::start_server(state, shutdown).await;

    if let Some(handle) = dispatcher {
        handle.stop().await;
    }

    result
}
