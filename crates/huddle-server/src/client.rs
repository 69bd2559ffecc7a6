//! Per-connection adapter between a websocket and the hub.
//!
//! The first frame a client sends is its raw session token, as a text
//! frame. The chat frame size limit does not apply to it. Once the token
//! checks out the connection is registered with the hub and split into two
//! tasks:
//!
//! - the **read pump** parses inbound frames, stamps them with the
//!   authenticated user and hands them to the hub;
//! - the **write pump** drains the connection's outbound queue to the
//!   socket and sends keepalive pings.
//!
//! Whichever pump stops first ends the connection, and the hub is told
//! exactly once.
//!
//! Both pumps are generic over `Stream`/`Sink` so they can be driven by
//! in-memory channels in tests.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use huddle_shared::protocol::{ChatMessage, InboundFrame};
use huddle_shared::session::SessionVerifier;
use huddle_shared::{DisplayIdentity, ProtocolError, SessionError, UserId};
use huddle_store::{RecordStore, StoreError};

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::hub::{ConnectedUser, ConnectionId, HubHandle};

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Timing and sizing for one connection.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    pub pong_wait: Duration,
    pub ping_period: Duration,
    pub write_wait: Duration,
    pub max_frame_size: usize,
    pub queue_capacity: usize,
}

impl From<&ServerConfig> for ConnectionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            pong_wait: config.pong_wait,
            ping_period: config.ping_period(),
            write_wait: config.write_wait,
            max_frame_size: config.max_frame_size,
            queue_capacity: config.outbound_queue_capacity,
        }
    }
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("No session token within the handshake deadline")]
    Timeout,

    #[error("Connection closed before authenticating")]
    Closed,

    #[error("Session token frame is not text")]
    NotText,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Unknown user: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
enum WriteError {
    #[error("Write deadline exceeded")]
    Timeout,

    #[error("Socket write failed: {0}")]
    Sink(String),
}

/// Entry point for an upgraded websocket.
pub async fn serve(socket: WebSocket, state: AppState) {
    let settings = ConnectionSettings::from(state.config.as_ref());
    let (sink, stream) = socket.split();
    run_connection(
        stream,
        sink,
        state.hub,
        state.store,
        state.verifier,
        settings,
    )
    .await;
}

/// Authenticate, register and pump one connection until it ends.
pub async fn run_connection<S, E, K>(
    mut stream: S,
    mut sink: K,
    hub: HubHandle,
    store: Arc<dyn RecordStore>,
    verifier: Arc<dyn SessionVerifier>,
    settings: ConnectionSettings,
) where
    S: Stream<Item = Result<Message, E>> + Unpin + Send + 'static,
    E: Display + Send + 'static,
    K: Sink<Message> + Unpin + Send + 'static,
    K::Error: Display,
{
    let (user_id, identity) = match authenticate(
        &mut stream,
        verifier.as_ref(),
        store.as_ref(),
        settings.write_wait,
    )
    .await
    {
        Ok(authenticated) => authenticated,
        Err(e) => {
            warn!(error = %e, "Rejected connection");
            let _ = send_with_deadline(&mut sink, Message::Close(None), settings.write_wait).await;
            return;
        }
    };

    let connection: ConnectionId = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
    let (outbound_tx, outbound_rx) = mpsc::channel(settings.queue_capacity);

    let registered = hub.register(ConnectedUser {
        id: user_id.clone(),
        connection,
        identity,
        outbound: outbound_tx,
    });
    if !registered {
        warn!(user = %user_id, "Hub unavailable, closing connection");
        return;
    }

    info!(user = %user_id, connection, "Connection authenticated");

    let mut writer = tokio::spawn(write_pump(sink, outbound_rx, settings));
    let mut reader = tokio::spawn(read_pump(stream, user_id.clone(), hub.clone(), settings));

    tokio::select! {
        _ = &mut reader => {
            hub.unregister(user_id.clone(), connection);
            // Unregistering closes the queue, which lets the writer send
            // a close frame and stop.
            if timeout(settings.write_wait, &mut writer).await.is_err() {
                writer.abort();
            }
        }
        _ = &mut writer => {
            reader.abort();
            hub.unregister(user_id.clone(), connection);
        }
    }

    debug!(user = %user_id, connection, "Connection closed");
}

/// Read the session token from the first frame and resolve it to a user.
pub async fn authenticate<S, E>(
    stream: &mut S,
    verifier: &dyn SessionVerifier,
    store: &dyn RecordStore,
    deadline: Duration,
) -> Result<(UserId, DisplayIdentity), HandshakeError>
where
    S: Stream<Item = Result<Message, E>> + Unpin,
{
    let frame = match timeout(deadline, stream.next()).await {
        Err(_) => return Err(HandshakeError::Timeout),
        Ok(None) | Ok(Some(Err(_))) => return Err(HandshakeError::Closed),
        Ok(Some(Ok(frame))) => frame,
    };

    let token = match frame {
        Message::Text(text) => text,
        Message::Close(_) => return Err(HandshakeError::Closed),
        _ => return Err(HandshakeError::NotText),
    };

    let user_id = verifier.verify(&token)?;
    let user = store.get_user(&user_id)?;
    Ok((user_id, user.identity()))
}

async fn read_pump<S, E>(mut stream: S, user_id: UserId, hub: HubHandle, settings: ConnectionSettings)
where
    S: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    loop {
        // Any frame, pongs included, resets the deadline.
        let frame = match timeout(settings.pong_wait, stream.next()).await {
            Err(_) => {
                debug!(user = %user_id, "Read deadline exceeded");
                return;
            }
            Ok(None) => return,
            Ok(Some(Err(e))) => {
                debug!(user = %user_id, error = %e, "Read failed");
                return;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let data = match frame {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
            Message::Ping(_) | Message::Pong(_) => continue,
            Message::Close(_) => return,
        };

        match InboundFrame::parse(&data, settings.max_frame_size) {
            Ok(frame) => {
                if !hub.broadcast(ChatMessage::stamp(frame, user_id.clone())) {
                    return;
                }
            }
            Err(ProtocolError::FrameTooLarge { size, max }) => {
                warn!(user = %user_id, size, max, "Frame too large, closing");
                return;
            }
            Err(e) => {
                warn!(user = %user_id, error = %e, "Skipping malformed frame");
            }
        }
    }
}

async fn write_pump<K>(mut sink: K, mut outbound: mpsc::Receiver<String>, settings: ConnectionSettings)
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    let mut keepalive = tokio::time::interval_at(
        Instant::now() + settings.ping_period,
        settings.ping_period,
    );

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(payload) = next else {
                    let _ = send_with_deadline(&mut sink, Message::Close(None), settings.write_wait).await;
                    return;
                };
                if let Err(e) = send_with_deadline(&mut sink, Message::Text(payload), settings.write_wait).await {
                    debug!(error = %e, "Stopping writer");
                    return;
                }
            }
            _ = keepalive.tick() => {
                if let Err(e) = send_with_deadline(&mut sink, Message::Ping(Vec::new()), settings.write_wait).await {
                    debug!(error = %e, "Keepalive failed");
                    return;
                }
            }
        }
    }
}

async fn send_with_deadline<K>(sink: &mut K, message: Message, deadline: Duration) -> Result<(), WriteError>
where
    K: Sink<Message> + Unpin,
    K::Error: Display,
{
    match timeout(deadline, sink.send(message)).await {
        Err(_) => Err(WriteError::Timeout),
        Ok(Err(e)) => Err(WriteError::Sink(e.to_string())),
        Ok(Ok(())) => Ok(()),
    }
}
