use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use super::messages::{ClientMessage, ServerMessage};
use super::registry::{Registry, Session};
use super::transport::{Connections, Transport};
use super::types::{ConnectionId, OutboundMessage, SessionId, SignalingError};

/// Commands sent to the registry actor
pub(crate) enum RegistryCommand {
    Connect {
        tx: mpsc::UnboundedSender<OutboundMessage>,
        reply: oneshot::Sender<ConnectionId>,
    },
    Action {
        from: ConnectionId,
        message: ClientMessage,
    },
    Disconnect {
        id: ConnectionId,
    },
    Inspect {
        session_id: SessionId,
        reply: oneshot::Sender<Option<Session>>,
    },
    Stats {
        reply: oneshot::Sender<RegistryStats>,
    },
}

/// Point-in-time counters of the registry actor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStats {
    pub sessions: usize,
    pub connections: usize,
}

/// Owns all session state; commands are applied strictly in arrival order.
pub(crate) async fn registry_actor(mut rx: mpsc::Receiver<RegistryCommand>) {
    let mut registry = Registry::new();
    let mut connections = Connections::new();
    // ids are never handed out twice in the lifetime of the actor
    let mut issued: u64 = 0;

    while let Some(cmd) = rx.recv().await {
        match cmd {
            RegistryCommand::Connect { tx, reply } => {
                issued += 1;
                let id = ConnectionId::issue(issued);
                connections.attach(id, tx);
                connections.send_to(id, &ServerMessage::Connected(id));

                info!("Connection {} attached ({} live)", id, connections.len());
                if reply.send(id).is_err() {
                    // caller went away before learning its id
                    connections.detach(&id);
                }
            }

            RegistryCommand::Action { from, message } => {
                if !connections.contains(&from) {
                    debug!("Ignoring action from detached connection {}", from);
                    continue;
                }
                registry.handle(from, message, &mut connections);
            }

            RegistryCommand::Disconnect { id } => {
                connections.detach(&id);
                let touched = registry.disconnect(id, &mut connections);
                info!(
                    "Connection {} detached ({} session(s) updated, {} live)",
                    id,
                    touched,
                    connections.len()
                );
            }

            RegistryCommand::Inspect { session_id, reply } => {
                let _ = reply.send(registry.session(&session_id).cloned());
            }

            RegistryCommand::Stats { reply } => {
                let _ = reply.send(RegistryStats {
                    sessions: registry.len(),
                    connections: connections.len(),
                });
            }
        }
    }

    debug!("Registry actor stopped");
}

/// Handle to communicate with the registry actor
#[derive(Clone)]
pub struct RegistryHandle {
    pub(crate) tx: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Spawn the actor on the current runtime and return its handle.
    pub fn spawn(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel::<RegistryCommand>(capacity);
        tokio::spawn(registry_actor(rx));
        Self { tx }
    }

    async fn send(&self, cmd: RegistryCommand) -> Result<(), SignalingError> {
        self.tx
            .send(cmd)
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    /// Register a new connection and receive its identifier
    pub async fn connect(
        &self,
        tx: mpsc::UnboundedSender<OutboundMessage>,
    ) -> Result<ConnectionId, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Connect {
            tx,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    /// Forward an action received from `from`
    pub async fn dispatch(
        &self,
        from: ConnectionId,
        message: ClientMessage,
    ) -> Result<(), SignalingError> {
        self.send(RegistryCommand::Action { from, message }).await
    }

    /// Report that a connection is gone
    pub async fn disconnect(&self, id: ConnectionId) {
        let _ = self.send(RegistryCommand::Disconnect { id }).await;
    }

    /// Copy of a session's current state, if it exists
    pub async fn session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<Session>, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Inspect {
            session_id,
            reply: reply_tx,
        })
        .await?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }

    pub async fn stats(&self) -> Result<RegistryStats, SignalingError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RegistryCommand::Stats { reply: reply_tx }).await?;
        reply_rx
            .await
            .map_err(|_| SignalingError::Internal("actor channel closed".to_string()))
    }
}
