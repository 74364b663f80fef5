use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{ConnectionId, SessionId};

/// Messages sent from client to server
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Create a session and become its host
    CreateSession(SessionId),

    /// Join an existing session as a viewer
    JoinSession(SessionId),

    Offer { to: String, offer: Value },

    Answer { to: String, answer: Value },

    IceCandidate { to: String, candidate: Value },

    /// Tear a session down for everyone in it
    EndSession(SessionId),
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// Identifier assigned to this connection
    Connected(ConnectionId),

    SessionCreated(SessionId),

    /// Error response
    Error(String),

    /// Sent to the host when a viewer joins
    #[serde(rename_all = "camelCase")]
    ViewerJoined {
        viewer_id: ConnectionId,
        viewer_count: usize,
    },

    /// Sent to a viewer after joining; carries the host to negotiate with
    ReadyToConnect(ConnectionId),

    Offer { from: ConnectionId, offer: Value },

    Answer { from: ConnectionId, answer: Value },

    IceCandidate { from: ConnectionId, candidate: Value },

    ViewerCountUpdate(usize),

    HostLeft,

    SessionEnded,
}

/// Opaque negotiation payload on its way to another connection.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Offer(Value),
    Answer(Value),
    IceCandidate(Value),
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::IceCandidate(_) => "ice-candidate",
        }
    }

    /// Wrap the payload for delivery, stamped with the sender.
    pub fn into_message(self, from: ConnectionId) -> ServerMessage {
        match self {
            Signal::Offer(offer) => ServerMessage::Offer { from, offer },
            Signal::Answer(answer) => ServerMessage::Answer { from, answer },
            Signal::IceCandidate(candidate) => ServerMessage::IceCandidate { from, candidate },
        }
    }
}
