// src/state/app_state.rs
use log::{error, info, warn};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::canvas::{Canvas, CanvasActor, CanvasHandle, SnapshotError};
use crate::config::{ConnectionLimits, HubConfig, Settings, CANVAS_CHANNEL_SIZE};
use crate::hub::{Hub, HubHandle};

/// Explicitly constructed dependencies shared by every route and connection.
pub struct AppState {
    pub canvas: CanvasHandle,
    pub hub: HubHandle,
    pub limits: ConnectionLimits,
    snapshot_path: Option<PathBuf>,
}

impl AppState {
    pub async fn new(settings: &Settings) -> Result<Arc<Self>, SnapshotError> {
        let canvas = match &settings.snapshot {
            Some(path) => load_canvas(path, settings.width, settings.height).await?,
            None => {
                info!("No snapshot configured, starting with a blank {}x{} canvas", settings.width, settings.height);
                Canvas::new(settings.width, settings.height)
            }
        };

        let app_state = Arc::new(Self::with_canvas(
            canvas,
            settings.hub_config(),
            settings.connection_limits(),
            settings.snapshot.clone(),
        ));

        if app_state.snapshot_path.is_some() && settings.save_interval > 0 {
            let app_state_clone = Arc::clone(&app_state);
            let period = Duration::from_secs(settings.save_interval);
            tokio::spawn(async move {
                let mut interval = interval(period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick fires immediately; nothing has changed yet.
                interval.tick().await;
                loop {
                    interval.tick().await;
                    if let Err(e) = app_state_clone.save_snapshot().await {
                        error!("Failed to save canvas snapshot: {}", e);
                    }
                }
            });
        }

        Ok(app_state)
    }

    pub fn with_canvas(
        canvas: Canvas,
        hub_config: HubConfig,
        limits: ConnectionLimits,
        snapshot_path: Option<PathBuf>,
    ) -> Self {
        AppState {
            canvas: CanvasActor::spawn(canvas, CANVAS_CHANNEL_SIZE),
            hub: Hub::spawn(hub_config),
            limits,
            snapshot_path,
        }
    }

    /// Writes the current canvas next to the target and renames it into place.
    pub async fn save_snapshot(&self) -> Result<(), SnapshotError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        let bytes = self.canvas.export().await?;
        let tmp_path = path.with_extension("tmp");
        tokio::fs::write(&tmp_path, &bytes).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        info!("Saved canvas snapshot to {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Closes every client, then persists the canvas.
    pub async fn shutdown(&self) {
        if let Err(e) = self.hub.shutdown().await {
            warn!("Hub did not acknowledge shutdown: {}", e);
        }
        if let Err(e) = self.save_snapshot().await {
            error!("Failed to save canvas snapshot on shutdown: {}", e);
        }
    }
}

async fn load_canvas(path: &Path, width: u32, height: u32) -> Result<Canvas, SnapshotError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => {
            let canvas = Canvas::load(&bytes, width, height)?;
            info!("Loaded {}x{} canvas from {}", width, height, path.display());
            Ok(canvas)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Snapshot {} not found, starting with a blank canvas", path.display());
            Ok(Canvas::new(width, height))
        }
        Err(e) => Err(e.into()),
    }
}
