//! # Torque API Server
//!
//! Workshop POS back end over HTTP.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Torque API Server                                │
//! │                                                                         │
//! │  Counter / app ───► HTTP (8080) ───► Routes ───► SQLite (WAL)          │
//! │                                                   ▲                     │
//! │                                                   │                     │
//! │                              overdue sweep ───────┘                     │
//! │                              (every OVERDUE_SWEEP_INTERVAL_SECS)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use torque_api::{build_router, ApiConfig, AppState};
use torque_core::Clock;
use torque_db::Database;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,torque_db=debug")),
        )
        .with_target(true)
        .init();

    info!("Starting Torque API server...");

    // Load configuration
    let config = ApiConfig::load()?;
    info!(
        port = config.http_port,
        db_url = %config.database_url,
        "Configuration loaded"
    );

    // Connect to database (runs migrations)
    let db = Database::new(config.db_config()).await?;
    info!("Database ready");

    let sweep = config
        .overdue_sweep_interval()
        .map(|period| spawn_overdue_sweep(db.clone(), period));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let state = AppState::new(db.clone(), config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweep {
        handle.abort();
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Flips overdue pending installment payments to `late` on a fixed period.
fn spawn_overdue_sweep(db: Database, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "Overdue sweep scheduled");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let today = db.clock().today();
            match db.installments().mark_overdue(today).await {
                Ok(0) => {}
                Ok(marked) => info!(marked, %today, "Installment payments marked late"),
                Err(e) => warn!(error = %e, "Overdue sweep failed"),
            }
        }
    })
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
