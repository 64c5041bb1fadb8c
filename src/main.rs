// src/main.rs
//
// File Tree:
// src/
// ├── main.rs
// ├── server/
// │   ├── mod.rs
// │   ├── connection.rs
// │   └── routes.rs
// ├── state/
// │   ├── mod.rs
// │   └── app_state.rs
// ├── hub/
// │   └── mod.rs
// ├── messages/
// │   └── mod.rs
// ├── canvas/
// │   ├── mod.rs
// │   └── actor.rs
// └── config/
//     └── mod.rs
//
// Files always start with "// src/<path>/<file>.rs" so files with the same
// name can be told apart.

use clap::Parser;
use env_logger::Builder;
use log::{error, info, LevelFilter};
use std::error::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::timeout;

mod canvas;
mod config;
mod hub;
mod messages;
mod server;
mod state;

use crate::config::{Settings, SHUTDOWN_TIMEOUT};
use crate::server::run_server;
use crate::state::AppState;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    Builder::new()
        .filter(None, LevelFilter::Info)
        .filter(Some("warp"), LevelFilter::Warn)
        .parse_env("RUST_LOG")
        .init();

    let settings = Settings::parse();
    async_main(settings).await
}

async fn async_main(settings: Settings) -> Result<(), Box<dyn Error>> {
    // A snapshot that does not match the configured canvas stops us here,
    // before anything listens.
    let app_state = AppState::new(&settings).await?;

    info!("Server starting with a {}x{} canvas...", settings.width, settings.height);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let mut server_handle = tokio::spawn(run_server(
        app_state,
        settings.port,
        settings.static_dir.clone(),
        shutdown_rx,
    ));

    let mut term_signal = signal(SignalKind::terminate())?;

    // Wait for a SIGINT or SIGTERM signal, or for the server to fail on its own
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = term_signal.recv() => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        }
        result = &mut server_handle => {
            // A server that fails on its own (e.g. the port is taken) fails the process
            return match result {
                Ok(Ok(())) => {
                    info!("Server stopped");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("Server error: {}", e);
                    let e: Box<dyn Error> = e;
                    Err(e)
                }
                Err(e) => {
                    error!("Error joining server task: {:?}", e);
                    Err(e.into())
                }
            };
        }
    }

    let _ = shutdown_tx.send(());

    match timeout(SHUTDOWN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => {
            error!("Server error: {}", e);
            let e: Box<dyn Error> = e;
            return Err(e);
        }
        Ok(Err(e)) => {
            error!("Error joining server task: {:?}", e);
            return Err(e.into());
        }
        Err(_) => error!("Server did not shut down within the allotted time."),
    }

    info!("Server has shut down gracefully.");
    Ok(())
}
