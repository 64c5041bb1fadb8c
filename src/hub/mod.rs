// src/hub/mod.rs
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Duration;

use crate::config::HubConfig;

#[cfg(test)]
mod tests;

static NEXT_CLIENT_ID: AtomicUsize = AtomicUsize::new(0);

pub type ClientId = usize;

/// An encoded wire message, shared between every queue it is delivered to.
pub type Payload = Arc<str>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HubError {
    #[error("broadcast queue saturated, message dropped")]
    Saturated,
    #[error("hub is no longer running")]
    Gone,
}

/// Why the server closed a client. Mapped onto WebSocket close codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    SlowConsumer,
    GoingAway,
}

impl CloseReason {
    pub fn code(self) -> u16 {
        match self {
            CloseReason::Normal => 1000,
            CloseReason::GoingAway => 1001,
            CloseReason::SlowConsumer => 1008,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            CloseReason::Normal => "bye",
            CloseReason::GoingAway => "server shutting down",
            CloseReason::SlowConsumer => "slow consumer",
        }
    }
}

enum Delivery {
    Queued,
    Full,
    Gone,
}

/// The hub's side of a connection: the sending half of its outbound queue and
/// the switch that tells its pumps to stop.
pub struct Client {
    id: ClientId,
    label: String,
    queue: mpsc::Sender<Payload>,
    closer: watch::Sender<Option<CloseReason>>,
}

/// The connection's side of a [`Client`].
pub struct ClientReceiver {
    pub queue: mpsc::Receiver<Payload>,
    pub closed: watch::Receiver<Option<CloseReason>>,
}

impl Client {
    pub fn new(label: impl Into<String>, capacity: usize) -> (Client, ClientReceiver) {
        let (queue_tx, queue_rx) = mpsc::channel(capacity.max(1));
        let (close_tx, close_rx) = watch::channel(None);
        let client = Client {
            id: NEXT_CLIENT_ID.fetch_add(1, Ordering::SeqCst),
            label: label.into(),
            queue: queue_tx,
            closer: close_tx,
        };
        let receiver = ClientReceiver {
            queue: queue_rx,
            closed: close_rx,
        };
        (client, receiver)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn try_deliver(&self, payload: &Payload) -> Delivery {
        match self.queue.try_send(Arc::clone(payload)) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Gone,
        }
    }

    /// Signals the pumps and drops the queue sender, which closes the queue.
    fn close(self, reason: CloseReason) {
        self.closer.send_replace(Some(reason));
    }
}

enum HubCommand {
    Register(Client),
    Unregister(ClientId),
    Broadcast {
        payload: Payload,
        origin: Option<ClientId>,
    },
    ClientCount(oneshot::Sender<usize>),
    Shutdown(oneshot::Sender<()>),
}

/// Owns the registry of live clients. Registration, removal and fan-out all
/// happen inside one task, fed by a single FIFO command queue.
pub struct Hub {
    clients: HashMap<ClientId, Client>,
    commands: mpsc::Receiver<HubCommand>,
}

impl Hub {
    pub fn spawn(config: HubConfig) -> HubHandle {
        let (commands_tx, commands_rx) = mpsc::channel(config.queue_size.max(1));
        let hub = Hub {
            clients: HashMap::new(),
            commands: commands_rx,
        };
        tokio::spawn(hub.run());

        HubHandle {
            commands: commands_tx,
            submit_timeout: config.submit_timeout,
        }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                HubCommand::Register(client) => self.register(client),
                HubCommand::Unregister(id) => self.unregister(id),
                HubCommand::Broadcast { payload, origin } => self.broadcast(&payload, origin),
                HubCommand::ClientCount(reply) => {
                    let _ = reply.send(self.clients.len());
                }
                HubCommand::Shutdown(reply) => {
                    self.close_all(CloseReason::GoingAway);
                    let _ = reply.send(());
                }
            }
        }
        self.close_all(CloseReason::GoingAway);
        debug!("Hub stopped: all handles dropped");
    }

    fn register(&mut self, client: Client) {
        info!("Client registered ({} #{}), total={}", client.label(), client.id, self.clients.len() + 1);
        self.clients.insert(client.id, client);
    }

    fn unregister(&mut self, id: ClientId) {
        if let Some(client) = self.clients.remove(&id) {
            info!("Client unregistered ({} #{}), total={}", client.label(), client.id, self.clients.len());
            client.close(CloseReason::Normal);
        }
    }

    fn broadcast(&mut self, payload: &Payload, origin: Option<ClientId>) {
        let mut dropped = Vec::new();
        for (&id, client) in &self.clients {
            if Some(id) == origin {
                continue;
            }
            match client.try_deliver(payload) {
                Delivery::Queued => {}
                Delivery::Full => dropped.push((id, CloseReason::SlowConsumer)),
                Delivery::Gone => dropped.push((id, CloseReason::Normal)),
            }
        }

        for (id, reason) in dropped {
            if let Some(client) = self.clients.remove(&id) {
                if reason == CloseReason::SlowConsumer {
                    warn!("Client buffer full, disconnecting ({} #{})", client.label(), client.id);
                } else {
                    debug!("Client queue already closed, removing ({} #{})", client.label(), client.id);
                }
                client.close(reason);
            }
        }
    }

    fn close_all(&mut self, reason: CloseReason) {
        if self.clients.is_empty() {
            return;
        }
        info!("Closing {} clients", self.clients.len());
        for (_, client) in self.clients.drain() {
            client.close(reason);
        }
    }
}

#[derive(Clone)]
pub struct HubHandle {
    commands: mpsc::Sender<HubCommand>,
    submit_timeout: Duration,
}

impl HubHandle {
    pub async fn register(&self, client: Client) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Register(client))
            .await
            .map_err(|_| HubError::Gone)
    }

    /// Removing a client that is already gone is a no-op.
    pub async fn unregister(&self, id: ClientId) -> Result<(), HubError> {
        self.commands
            .send(HubCommand::Unregister(id))
            .await
            .map_err(|_| HubError::Gone)
    }

    /// Submits a payload for fan-out to every client except `origin`. If the hub
    /// queue stays full for the submit timeout the payload is dropped.
    pub async fn broadcast(
        &self,
        payload: impl Into<Payload>,
        origin: Option<ClientId>,
    ) -> Result<(), HubError> {
        let command = HubCommand::Broadcast {
            payload: payload.into(),
            origin,
        };
        match self.commands.send_timeout(command, self.submit_timeout).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => {
                warn!("Global broadcast queue saturated, dropping message");
                Err(HubError::Saturated)
            }
            Err(SendTimeoutError::Closed(_)) => Err(HubError::Gone),
        }
    }

    pub async fn client_count(&self) -> Result<usize, HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(HubCommand::ClientCount(reply_tx))
            .await
            .map_err(|_| HubError::Gone)?;
        reply_rx.await.map_err(|_| HubError::Gone)
    }

    /// Closes every registered client. Returns once the registry is empty.
    pub async fn shutdown(&self) -> Result<(), HubError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(HubCommand::Shutdown(reply_tx))
            .await
            .map_err(|_| HubError::Gone)?;
        reply_rx.await.map_err(|_| HubError::Gone)
    }
}
