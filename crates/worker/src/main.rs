use std::time::Duration;

use courier_events::store::Stores;
use courier_events::Engine;
use courier_worker::Scheduler;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Grace period for the loops to finish their current pass on shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "courier_worker=debug,courier_events=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json");
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = courier_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    courier_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    courier_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    let grace = std::env::var("SHUTDOWN_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS);

    let shutdown = CancellationToken::new();
    let engine = Engine::from_env(Stores::postgres(pool), shutdown.clone())
        .expect("Failed to initialise delivery engine");

    let scheduler = Scheduler::start(&engine, shutdown.clone());
    tracing::info!(tasks = ?scheduler.task_names(), "Worker started");

    shutdown_signal().await;

    let stragglers = scheduler.stop(Duration::from_secs(grace)).await;
    if stragglers.is_empty() {
        tracing::info!("Worker stopped");
    } else {
        tracing::warn!(?stragglers, "Worker stopped with tasks still running");
    }
}

/// Wait for SIGINT or (on Unix) SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
