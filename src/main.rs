use std::net::SocketAddr;

use identity_reconciler_lib::routes;
use identity_reconciler_lib::services::ContactService;
use identity_reconciler_lib::state::{load_config, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config()?;
    let contacts = ContactService::open(&config)?;
    let app = routes::router(AppState::new(contacts));

    let addr: SocketAddr = format!("{}:{}", config.bind_host, config.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("identity-reconciler listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("identity-reconciler stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested, draining connections");
}
