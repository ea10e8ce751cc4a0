use gateway::config::AppConfig;
use gateway::state::AppState;
use gateway::{cleanup, db, retry};
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level))
        .init();

    let cfg = AppConfig::from_env().expect("invalid process configuration");
    let bind_addr = cfg.bind_addr.clone();

    info!("connecting to database...");
    let pool = db::create_pool(&cfg.database_url).await;
    db::run_migrations(&pool).await;
    info!("migrations applied");

    let state = AppState::new(pool, cfg);

    // Re-seed retry messages lost to an unclean shutdown before consumers start.
    match retry::trigger_stranded_retries(&state).await {
        Ok(0) => {}
        Ok(n) => info!(published = n, "startup recovery re-published retry messages"),
        Err(e) => warn!("startup recovery sweep failed: {e}"),
    }

    tokio::spawn(retry::run_retry_consumer(state.clone()));
    tokio::spawn(retry::run_dlq_consumer(state.clone()));
    tokio::spawn(cleanup::run_cleanup(state.clone()));

    let router = gateway::build_router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind");
    info!(addr = %bind_addr, "gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
    info!("gateway shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
