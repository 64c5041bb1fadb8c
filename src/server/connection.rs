// src/server/connection.rs
use futures::{Sink, SinkExt, Stream, StreamExt};
use log::{debug, error, info, warn};
use std::fmt::Display;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval_at, timeout, Duration, Instant};
use warp::ws::{Message, WebSocket};

use crate::config::ConnectionLimits;
use crate::hub::{Client, ClientId, ClientReceiver, CloseReason, Payload};
use crate::messages::{ProtocolError, WireMessage};
use crate::state::AppState;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub async fn handle_connection(ws: WebSocket, label: String, state: Arc<AppState>) {
    let (ws_tx, ws_rx) = ws.split();
    serve_client(ws_tx, ws_rx, label, state).await;
}

/// Runs one client from upgrade to teardown: register, send the current
/// canvas, then pump frames in both directions until either side stops.
pub(super) async fn serve_client<S, R, E>(mut ws_tx: S, ws_rx: R, label: String, state: Arc<AppState>)
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: std::error::Error + Send + Sync + 'static,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let (client, receiver) = Client::new(label.clone(), state.limits.client_queue);
    let client_id = client.id();
    let ClientReceiver { queue, closed } = receiver;

    if let Err(e) = state.hub.register(client).await {
        error!("Could not register client {}: {}", label, e);
        let _ = ws_tx.close().await;
        return;
    }
    info!("New client connected: {} #{}", label, client_id);

    if let Err(e) = send_init(&mut ws_tx, &state).await {
        error!("Failed to send canvas to {}: {}", label, e);
        let _ = state.hub.unregister(client_id).await;
        let _ = ws_tx.close().await;
        return;
    }

    let (writer_done_tx, writer_done_rx) = oneshot::channel();
    let writer = tokio::spawn(write_pump(
        ws_tx,
        queue,
        closed.clone(),
        label.clone(),
        state.limits,
        writer_done_tx,
    ));

    read_pump(ws_rx, &state, client_id, &label, closed, writer_done_rx).await;

    if let Err(e) = state.hub.unregister(client_id).await {
        warn!("Could not unregister client {}: {}", label, e);
    }
    if let Err(e) = writer.await {
        error!("Error joining writer for {}: {:?}", label, e);
    }
    info!("Client disconnected: {} #{}", label, client_id);
}

async fn send_init<S>(ws_tx: &mut S, state: &AppState) -> Result<(), BoxError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let snapshot = state.canvas.snapshot().await?;
    let text = WireMessage::Init(snapshot).encode()?;
    write_frame(ws_tx, Message::text(text), state.limits.write_timeout).await
}

/// Stops when the peer goes away, the hub closes the client, or the writer
/// has given up on the socket.
async fn read_pump<R, E>(
    mut ws_rx: R,
    state: &AppState,
    client_id: ClientId,
    label: &str,
    mut closed: watch::Receiver<Option<CloseReason>>,
    mut writer_done: oneshot::Receiver<()>,
) where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let idle_timeout = state.limits.read_idle_timeout;
    loop {
        let next = tokio::select! {
            _ = closed.changed() => {
                debug!("Reader for {} stopping, closed by hub", label);
                break;
            }
            _ = &mut writer_done => {
                debug!("Reader for {} stopping, writer exited", label);
                break;
            }
            next = timeout(idle_timeout, ws_rx.next()) => next,
        };

        let msg = match next {
            Err(_) => {
                info!("Client {} idle for {:?}, disconnecting", label, idle_timeout);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                error!("WebSocket read error ({}): {}", label, e);
                break;
            }
            Ok(Some(Ok(msg))) => msg,
        };

        if msg.is_close() {
            debug!("Client {} closed the connection", label);
            break;
        }
        if msg.is_ping() || msg.is_pong() {
            continue;
        }
        let Ok(text) = msg.to_str() else {
            warn!("Unexpected non-text frame from {}, disconnecting", label);
            break;
        };

        handle_text(text, state, client_id, label).await;
    }
}

/// Protocol errors drop the offending message; the connection stays up.
async fn handle_text(text: &str, state: &AppState, client_id: ClientId, label: &str) {
    let params = match WireMessage::decode(text) {
        Ok(WireMessage::Draw(params)) => params,
        Ok(other) => {
            warn!("Dropping message from {}: {}", label, ProtocolError::UnexpectedMethod(other.method()));
            return;
        }
        Err(e) => {
            warn!("Dropping message from {}: {}", label, e);
            return;
        }
    };

    let patch = params.to_patch();
    if let Err(e) = patch.validate(state.canvas.width(), state.canvas.height()) {
        warn!("Dropping patch from {}: {}", label, e);
        return;
    }
    if let Err(e) = state.canvas.apply(patch).await {
        warn!("Dropping patch from {}: {}", label, e);
        return;
    }

    match WireMessage::Draw(params).encode() {
        Ok(payload) => {
            if let Err(e) = state.hub.broadcast(payload, Some(client_id)).await {
                debug!("Broadcast from {} not delivered: {}", label, e);
            }
        }
        Err(e) => error!("Failed to encode draw message from {}: {}", label, e),
    }
}

/// Drains the client queue onto the socket. `_done` is dropped on exit, which
/// wakes the reader.
async fn write_pump<S>(
    mut ws_tx: S,
    mut queue: mpsc::Receiver<Payload>,
    mut closed: watch::Receiver<Option<CloseReason>>,
    label: String,
    limits: ConnectionLimits,
    _done: oneshot::Sender<()>,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    let mut ping_interval = interval_at(Instant::now() + limits.ping_interval, limits.ping_interval);

    loop {
        let frame = tokio::select! {
            biased;
            _ = closed.changed() => {
                let reason = *closed.borrow();
                if let Some(reason) = reason {
                    let frame = Message::close_with(reason.code(), reason.text());
                    let _ = timeout(limits.write_timeout, ws_tx.send(frame)).await;
                }
                break;
            }
            payload = queue.recv() => match payload {
                Some(payload) => Message::text(payload.as_ref()),
                None => break,
            },
            _ = ping_interval.tick() => Message::ping(Vec::new()),
        };

        if let Err(e) = write_frame(&mut ws_tx, frame, limits.write_timeout).await {
            error!("WebSocket write error ({}): {}", label, e);
            break;
        }
    }

    // The hub may already have closed the socket; a second close is harmless.
    let _ = ws_tx.close().await;
}

async fn write_frame<S>(ws_tx: &mut S, frame: Message, write_timeout: Duration) -> Result<(), BoxError>
where
    S: Sink<Message> + Unpin,
    S::Error: std::error::Error + Send + Sync + 'static,
{
    timeout(write_timeout, ws_tx.send(frame)).await??;
    Ok(())
}
