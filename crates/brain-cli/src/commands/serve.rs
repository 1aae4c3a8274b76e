use std::net::SocketAddr;

use brain_core::BrainConfig;
use tracing::info;

use super::open_store;

/// Run the HTTP API until Ctrl-C.
pub fn serve(config: &BrainConfig) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run_server(config))
}

async fn run_server(config: &BrainConfig) -> anyhow::Result<()> {
    info!("Brain API starting");

    let store = open_store(config)?;
    info!(path = ?config.storage.path, "state store opened");

    let router = brain_api::build_router(store, config.state.clone());
    let addr: SocketAddr = format!("{}:{}", config.server.bind, config.server.port).parse()?;

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("Brain API stopped");
    Ok(())
}
