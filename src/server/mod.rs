// src/server/mod.rs
use log::info;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::oneshot;

mod connection;
mod routes;

use crate::state::AppState;

pub use routes::create_routes;

pub async fn run_server(
    app_state: Arc<AppState>,
    port: u16,
    static_dir: Option<PathBuf>,
    shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let routes = create_routes(app_state.clone(), static_dir);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();

    let (bound, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async move {
        let _ = shutdown_rx.await;
        info!("Shutdown signal received, stopping server...");
    })?;

    info!("Server listening on http://{}", bound);
    info!("WebSocket endpoint available at ws://{}/ws and ws://{}/socket", bound, bound);
    info!("Health check available at http://{}/api/health", bound);

    server.await;

    // Upgraded sockets outlive the listener; close them and persist the canvas.
    app_state.shutdown().await;

    info!("Server shutdown complete");
    Ok(())
}
