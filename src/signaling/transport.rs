use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::messages::ServerMessage;
use super::types::{ConnectionId, OutboundMessage};

/// Delivery side of the connection layer, as seen by the registry.
///
/// Every send is best effort: an unknown or departed target is not an error
/// for the sender.
pub trait Transport {
    fn send_to(&mut self, to: ConnectionId, message: &ServerMessage);

    fn send_to_group<I>(&mut self, members: I, message: &ServerMessage)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        for member in members {
            self.send_to(member, message);
        }
    }
}

/// Outbound channels of every live WebSocket connection.
#[derive(Debug, Default)]
pub struct Connections {
    peers: HashMap<ConnectionId, mpsc::UnboundedSender<OutboundMessage>>,
}

impl Connections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, id: ConnectionId, tx: mpsc::UnboundedSender<OutboundMessage>) {
        self.peers.insert(id, tx);
    }

    pub fn detach(&mut self, id: &ConnectionId) -> bool {
        self.peers.remove(id).is_some()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.peers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    fn deliver(&self, to: ConnectionId, msg: &OutboundMessage) {
        match self.peers.get(&to) {
            Some(tx) => {
                if tx.send(msg.clone()).is_err() {
                    debug!("Dropping message for {}: channel closed", to);
                }
            }
            None => debug!("Dropping message for unknown connection {}", to),
        }
    }
}

fn encode(message: &ServerMessage) -> Option<OutboundMessage> {
    match serde_json::to_string(message) {
        Ok(json) => Some(OutboundMessage::from(json)),
        Err(e) => {
            error!("Failed to encode server message: {}", e);
            None
        }
    }
}

impl Transport for Connections {
    fn send_to(&mut self, to: ConnectionId, message: &ServerMessage) {
        if let Some(msg) = encode(message) {
            self.deliver(to, &msg);
        }
    }

    fn send_to_group<I>(&mut self, members: I, message: &ServerMessage)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        // serialize once, clone the bytes per member
        if let Some(msg) = encode(message) {
            for member in members {
                self.deliver(member, &msg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ConnectionId {
        ConnectionId::parse(s).unwrap()
    }

    #[test]
    fn send_to_reaches_attached_connection() {
        let mut connections = Connections::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections.attach(id("conn_a"), tx);

        connections.send_to(id("conn_a"), &ServerMessage::HostLeft);

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.as_str(), r#"{"type":"host-left"}"#);
    }

    #[test]
    fn send_to_unknown_connection_is_silent() {
        let mut connections = Connections::new();
        connections.send_to(id("conn_x"), &ServerMessage::SessionEnded);
        assert!(connections.is_empty());
    }

    #[test]
    fn send_to_closed_channel_is_silent() {
        let mut connections = Connections::new();
        let (tx, rx) = mpsc::unbounded_channel();
        connections.attach(id("conn_a"), tx);
        drop(rx);

        connections.send_to(id("conn_a"), &ServerMessage::SessionEnded);
        assert!(connections.contains(&id("conn_a")));
    }

    #[test]
    fn group_send_reaches_every_member() {
        let mut connections = Connections::new();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();
        let (tx_c, mut rx_c) = mpsc::unbounded_channel();
        connections.attach(id("conn_a"), tx_a);
        connections.attach(id("conn_b"), tx_b);
        connections.attach(id("conn_c"), tx_c);

        connections.send_to_group([id("conn_a"), id("conn_b")], &ServerMessage::SessionEnded);

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn detach_stops_delivery() {
        let mut connections = Connections::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        connections.attach(id("conn_a"), tx);
        assert!(connections.detach(&id("conn_a")));
        assert!(!connections.detach(&id("conn_a")));

        connections.send_to(id("conn_a"), &ServerMessage::HostLeft);
        assert!(rx.try_recv().is_err());
        assert_eq!(connections.len(), 0);
    }
}
