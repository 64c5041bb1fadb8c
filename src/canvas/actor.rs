// src/canvas/actor.rs
use log::{debug, warn};
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Duration;

use super::{Canvas, CanvasError, Patch};
use crate::config::CANVAS_SUBMIT_TIMEOUT;
use crate::messages::Snapshot;

enum CanvasCommand {
    Apply(Patch),
    Snapshot(oneshot::Sender<Snapshot>),
    Export(oneshot::Sender<Vec<u8>>),
}

/// Sole owner of the canonical canvas. Commands are handled one at a time in
/// arrival order, so a snapshot never sees half of a patch.
pub struct CanvasActor {
    canvas: Canvas,
    commands: mpsc::Receiver<CanvasCommand>,
}

impl CanvasActor {
    pub fn spawn(canvas: Canvas, queue_size: usize) -> CanvasHandle {
        let (commands_tx, commands_rx) = mpsc::channel(queue_size.max(1));
        let handle = CanvasHandle {
            commands: commands_tx,
            width: canvas.width(),
            height: canvas.height(),
            submit_timeout: CANVAS_SUBMIT_TIMEOUT,
        };

        let actor = CanvasActor {
            canvas,
            commands: commands_rx,
        };
        tokio::spawn(actor.run());

        handle
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            self.handle(command);
        }
        debug!("Canvas actor stopped: all handles dropped");
    }

    fn handle(&mut self, command: CanvasCommand) {
        match command {
            CanvasCommand::Apply(patch) => {
                if let Err(e) = self.canvas.apply(&patch) {
                    warn!("Rejected patch: {}", e);
                }
            }
            CanvasCommand::Snapshot(reply) => {
                // The requester may have gone away; nothing to do then.
                let _ = reply.send(Snapshot::of(&self.canvas));
            }
            CanvasCommand::Export(reply) => {
                let _ = reply.send(self.canvas.export());
            }
        }
    }
}

/// Cheap, cloneable entry point to the canvas actor.
#[derive(Clone)]
pub struct CanvasHandle {
    commands: mpsc::Sender<CanvasCommand>,
    width: u32,
    height: u32,
    submit_timeout: Duration,
}

impl CanvasHandle {
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Queues a patch. Waits at most the submit timeout for room in the queue.
    pub async fn apply(&self, patch: Patch) -> Result<(), CanvasError> {
        self.commands
            .send_timeout(CanvasCommand::Apply(patch), self.submit_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => CanvasError::Busy,
                SendTimeoutError::Closed(_) => CanvasError::ActorGone,
            })
    }

    pub async fn snapshot(&self) -> Result<Snapshot, CanvasError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(CanvasCommand::Snapshot(reply_tx))
            .await
            .map_err(|_| CanvasError::ActorGone)?;
        reply_rx.await.map_err(|_| CanvasError::ActorGone)
    }

    pub async fn export(&self) -> Result<Vec<u8>, CanvasError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(CanvasCommand::Export(reply_tx))
            .await
            .map_err(|_| CanvasError::ActorGone)?;
        reply_rx.await.map_err(|_| CanvasError::ActorGone)
    }
}
