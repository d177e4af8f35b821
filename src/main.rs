// Auction tracker entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to stdout)
// 2. Load config
// 3. Open database
// 4. Seed team and roster data (no-ops when already present)
// 5. Create the update bus and application state
// 6. Serve HTTP + WebSocket until Ctrl+C

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use auction_tracker::broadcast::UpdateBus;
use auction_tracker::config;
use auction_tracker::db::Database;
use auction_tracker::seed;
use auction_tracker::server::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Auction tracker starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: port={}, db={}, {} teams",
        config.port,
        config.db_path,
        config.teams.len()
    );

    // 3. Open database
    let db = Arc::new(Database::open(&config.db_path).context("failed to open database")?);
    info!("Database opened at {}", config.db_path);

    // 4. Seed teams and roster
    db.seed_teams(&config.teams).context("failed to seed teams")?;
    let inserted = seed::seed_roster(&db, std::path::Path::new(&config.roster_path))
        .context("failed to seed roster")?;
    if inserted > 0 {
        info!("Seeded {} players from {}", inserted, config.roster_path);
    }

    // 5. Application state
    let bus = UpdateBus::new();
    let state = AppState::new(db, bus, &config.admin_key);
    let app = server::router(state);

    // 6. Serve until Ctrl+C
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Auction tracker shut down cleanly");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
    }
}

/// Initialize tracing to stdout with an env-filter override.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("auction_tracker=info,warn")),
        )
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
