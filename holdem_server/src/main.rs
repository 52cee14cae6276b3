//! Hold'em room server.
//!
//! Spawns one actor per room behind a `RoomRegistry` and serves the REST and
//! WebSocket transport. Balances live in the configured ledger backend.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Error, anyhow};
use holdem_engine::{
    InMemoryLedger, Ledger, PgLedger, RoomConfig, RoomRegistry,
    db::Database,
};
use holdem_server::{
    api::{self, AppState},
    config::{CliOverrides, LedgerBackend, ServerConfig},
    logging, metrics,
};
use log::{error, info};
use pico_args::Arguments;
use tokio::sync::mpsc;

const HELP: &str = "\
Run a hold'em room server

USAGE:
  holdem_server [OPTIONS]

OPTIONS:
  --bind          IP:PORT  Server socket bind address     [default: env SERVER_BIND or 127.0.0.1:6969]
  --ledger        BACKEND  memory or postgres             [default: env LEDGER_BACKEND or memory]
  --metrics-bind  IP:PORT  Prometheus listener            [default: env METRICS_BIND, off when unset]
  --rooms         N        Number of rooms to create      [default: env INITIAL_ROOMS or 1]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  DATABASE_URL             PostgreSQL connection string (postgres ledger)
  STARTING_BALANCE         Credit for new players (memory ledger)
  ROOM_*                   Room defaults: blinds, rake, buy-in range, timers, bots
  RUST_LOG                 Log filter
  (See .env.example for all configuration options)
";

/// Observer events buffered before metrics fall behind
const OBSERVER_BUFFER: usize = 1024;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let overrides = CliOverrides {
        bind: pargs.opt_value_from_str("--bind")?,
        metrics_bind: pargs.opt_value_from_str("--metrics-bind")?,
        ledger: pargs.opt_value_from_str("--ledger")?,
        rooms: pargs.opt_value_from_str("--rooms")?,
    };

    logging::init();

    let config = ServerConfig::from_env(overrides)?;
    config.validate()?;
    info!(
        "Starting hold'em server at {} with the {} ledger",
        config.bind, config.ledger
    );

    let (ledger, dev_ledger, database): (
        Arc<dyn Ledger>,
        Option<Arc<InMemoryLedger>>,
        Option<Database>,
    ) = match config.ledger {
        LedgerBackend::Memory => {
            let memory = Arc::new(InMemoryLedger::new());
            let ledger: Arc<dyn Ledger> = memory.clone();
            (ledger, Some(memory), None)
        }
        LedgerBackend::Postgres => {
            let db_config = config
                .database
                .as_ref()
                .ok_or_else(|| anyhow!("DATABASE_URL is required for the postgres ledger"))?;
            let db = Database::new(db_config)
                .await
                .context("Failed to connect to database")?;
            db.migrate().await.context("Failed to apply ledger migrations")?;
            info!("Database connected and migrated");
            let ledger: Arc<dyn Ledger> = Arc::new(PgLedger::new(Arc::new(db.pool().clone())));
            (ledger, None, Some(db))
        }
    };

    let mut registry = RoomRegistry::new(ledger, config.room_defaults.clone())
        .with_idle_ttl(config.idle_ttl);

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(|e| anyhow!(e))?;
        let (events_tx, events_rx) = mpsc::channel(OBSERVER_BUFFER);
        metrics::spawn_observer(events_rx);
        registry = registry.with_observer(events_tx);
        info!("Prometheus metrics at http://{metrics_bind}/metrics");
    }

    create_initial_rooms(&registry, &config.room_defaults, config.initial_rooms).await;
    let sweeper = registry.spawn_sweeper(config.sweep_interval);
    let gauge = spawn_room_gauge(registry.clone(), config.sweep_interval);

    let mut state = AppState::new(registry.clone());
    if let Some(ledger) = dev_ledger {
        state = state.with_dev_ledger(ledger, config.starting_balance);
    }
    if let Some(db) = database.clone() {
        state = state.with_database(db);
    }

    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down: closing rooms and cashing out seats");
    sweeper.abort();
    gauge.abort();
    registry.shutdown_all().await;

    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

async fn create_initial_rooms(registry: &RoomRegistry, defaults: &RoomConfig, count: usize) {
    for i in 0..count {
        let mut config = defaults.clone();
        if count > 1 {
            config.name = format!("{} {}", defaults.name, i + 1);
        }

        match registry.create_room(config).await {
            Ok(room_id) => info!("Created room {} with ID {}", i + 1, room_id),
            Err(e) => error!("Failed to create room {}: {}", i + 1, e),
        }
    }

    for room in registry.list().await {
        info!(
            "  - {} (ID: {}) - {}/{} seats, blinds: {}/{}",
            room.name, room.room_id, room.seated, room.max_seats, room.small_blind, room.big_blind
        );
    }
}

/// Keep the open-rooms gauge current as rooms are swept.
fn spawn_room_gauge(registry: RoomRegistry, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            metrics::active_rooms(registry.room_count().await);
        }
    })
}

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {e}");
        std::future::pending::<()>().await;
    }
}
