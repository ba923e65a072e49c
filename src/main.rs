use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use taxi_dispatch::api;
use taxi_dispatch::config::Config;
use taxi_dispatch::engine::sweeper::{run_sweeper, SweeperSettings};
use taxi_dispatch::error::AppError;
use taxi_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let shared_state = Arc::new(AppState::new(config.match_policy));
    let app = api::rest::router(shared_state.clone());

    let sweeper = SweeperSettings {
        interval: config.sweep_interval(),
        accept_timeout: config.accept_timeout(),
        retention: config.booking_retention(),
    };
    if sweeper.is_enabled() {
        tokio::spawn(run_sweeper(shared_state.clone(), sweeper));
    }

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        match_policy = %config.match_policy,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
