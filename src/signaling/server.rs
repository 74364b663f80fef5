use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::RegistryHandle;
use super::messages::{ClientMessage, ServerMessage};
use super::types::{ConnectionId, OutboundMessage, SignalingError};
use crate::config::ServerConfig;

#[derive(Debug, Clone, Copy)]
struct Keepalive {
    ping_interval: Duration,
    pong_timeout: Duration,
}

pub struct SignalingServer {
    listener: TcpListener,
    handle: RegistryHandle,
    keepalive: Keepalive,
}

impl SignalingServer {
    /// Bind the listener and start the registry actor
    pub async fn bind(config: &ServerConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind(config.bind_addr()).await?;
        let handle = RegistryHandle::spawn(config.command_queue_capacity);

        info!("Signaling server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handle,
            keepalive: Keepalive {
                ping_interval: config.ping_interval,
                pong_timeout: config.pong_timeout,
            },
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn handle(&self) -> RegistryHandle {
        self.handle.clone()
    }

    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let handle = self.handle.clone();
            let keepalive = self.keepalive;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, handle, keepalive).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    handle: RegistryHandle,
    keepalive: Keepalive,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundMessage>();
    let (ctrl_tx, mut ctrl_rx) = mpsc::unbounded_channel::<Message>();

    let id = handle.connect(tx.clone()).await?;
    info!("WebSocket connection {} from {}", id, addr);

    let send_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    let ws_msg = Message::Text(msg.into_inner());
                    if ws_tx.send(ws_msg).await.is_err() {
                        break;
                    }
                }
                Some(ctrl_msg) = ctrl_rx.recv() => {
                    if ws_tx.send(ctrl_msg).await.is_err() {
                        break;
                    }
                }
                else => break,
            }
        }
    });

    let mut ping_interval = tokio::time::interval(keepalive.ping_interval);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", id);
                    break;
                }
                if ctrl_tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + keepalive.pong_timeout);
                debug!("Ping sent to {}", id);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", id);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error on {}: {}", id, e);
                        break;
                    }
                    None => break,
                };

                let result = match msg {
                    Message::Text(text) => handle_frame(text.as_str(), id, &tx, &handle).await,
                    Message::Binary(data) => match std::str::from_utf8(&data) {
                        Ok(text) => handle_frame(text, id, &tx, &handle).await,
                        Err(e) => {
                            reply_error(&tx, format!("Invalid message: {}", e));
                            Ok(())
                        }
                    },
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", id);
                        Ok(())
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", id);
                        break;
                    }
                    _ => Ok(()),
                };

                if let Err(e) = result {
                    warn!("Message handling error on {}: {}", id, e);
                    break;
                }
            }
        }
    }

    handle.disconnect(id).await;

    send_task.abort();
    info!("WebSocket disconnected: {} ({})", id, addr);

    Ok(())
}

/// Decode one frame and queue it for the registry. A frame that does not
/// decode is answered with an `error`; only a dead actor is fatal.
async fn handle_frame(
    text: &str,
    id: ConnectionId,
    tx: &mpsc::UnboundedSender<OutboundMessage>,
    handle: &RegistryHandle,
) -> Result<(), SignalingError> {
    let client_msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            reply_error(tx, SignalingError::from(e).to_string());
            return Ok(());
        }
    };

    handle.dispatch(id, client_msg).await
}

fn reply_error(tx: &mpsc::UnboundedSender<OutboundMessage>, message: String) {
    match serde_json::to_string(&ServerMessage::Error(message)) {
        Ok(json) => {
            let _ = tx.send(OutboundMessage::from(json));
        }
        Err(e) => error!("Failed to encode error reply: {}", e),
    }
}
