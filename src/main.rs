use carbon_dashboard::{
    gateway::Gateway,
    router,
    state::watch_session_expiry,
    storage::load_session,
    AppConfig, AppState,
};
use std::net::SocketAddr;
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = AppConfig::from_env();
    if let Some(parent) = config.data_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let session = load_session(&config.data_path).await;
    if session.user.is_some() {
        info!("restored session from {}", config.data_path.display());
    }

    let gateway = Gateway::new(&config.backend_url, config.backend_timeout)?;
    info!("backend at {}", config.backend_url);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config, gateway, session);
    tokio::spawn(watch_session_expiry(state.clone()));

    let app = router(state);
    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
