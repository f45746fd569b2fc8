//! Tally API Server
//!
//! Main entry point for the ledger service. Serves the HTTP API and runs the
//! background reconciler until Ctrl-C.

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tally_api::{AppState, create_router};
use tally_core::{Ledger, LedgerSettings};
use tally_db::{PgLedgerStore, connect_with};
use tally_shared::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tally=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = AppConfig::load()?;

    // Connect to database
    let db = connect_with(&config.database).await?;
    info!("Connected to database");

    let settings = LedgerSettings::from_config(&config.ledger, &config.reconciler);
    let ledger = Ledger::new(PgLedgerStore::new(db), settings);
    let chart = ledger.directory().load().await?;
    info!(
        accounts = chart.len(),
        currency = %config.ledger.currency,
        retained_earnings = %config.ledger.retained_earnings_code,
        "Chart of accounts loaded"
    );

    // Background reconciler
    let shutdown = CancellationToken::new();
    let reconciler = if config.reconciler.enabled {
        info!(
            interval_secs = config.reconciler.interval_secs,
            run_on_startup = config.reconciler.run_on_startup,
            "Starting reconciler"
        );
        Some(ledger.reconciler_job().spawn(shutdown.clone()))
    } else {
        warn!("Reconciler disabled; balance drift will only be repaired on demand");
        None
    };

    // Create router
    let app = create_router(AppState::new(ledger));

    // Start server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    if let Some(handle) = reconciler {
        handle.await?;
    }
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
