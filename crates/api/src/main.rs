use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use courier_api::config::ServerConfig;
use courier_api::router::build_app_router;
use courier_api::state::AppState;
use courier_api::ws;
use courier_events::store::Stores;
use courier_events::{Engine, WebhookFanout};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "courier_api=debug,courier_events=debug,tower_http=debug".into());
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json");
    let registry = tracing_subscriber::registry().with(filter);
    if json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = ServerConfig::from_env().expect("Invalid server configuration");
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = courier_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    courier_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    courier_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");

    // --- Delivery engine ---
    let shutdown = CancellationToken::new();
    let engine = Engine::from_env(Stores::postgres(pool), shutdown.clone())
        .expect("Failed to initialise delivery engine");

    let mut background: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    let fanout = WebhookFanout::new(Arc::clone(&engine.webhooks));
    let receiver = engine.bus.subscribe();
    let token = shutdown.child_token();
    background.push((
        "webhook fan-out",
        tokio::spawn(async move { fanout.run(receiver, token).await }),
    ));

    if config.embedded_scheduler {
        let processor = Arc::clone(&engine.processor);
        let token = shutdown.child_token();
        background.push((
            "queue processor",
            tokio::spawn(async move { processor.run(token).await }),
        ));

        let digests = Arc::clone(&engine.digests);
        let token = shutdown.child_token();
        background.push((
            "digest aggregator",
            tokio::spawn(async move { digests.run(token).await }),
        ));
        tracing::info!("Embedded scheduler started");
    }

    // --- WebSocket manager ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager));

    // --- App state ---
    let state = AppState {
        engine,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
    };
    let app = build_app_router(state, &config).expect("Invalid router configuration");

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    shutdown.cancel();
    let grace = Duration::from_secs(config.shutdown_timeout_secs);
    for (name, handle) in background {
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!(task = name, "Background task did not stop in time");
        }
    }
    tracing::info!("Background tasks stopped");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;
    heartbeat_handle.abort();

    tracing::info!("Graceful shutdown complete");
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
