use std::fmt;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Signaling server errors
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("Session not found")]
    SessionNotFound(SessionId),

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

const CONNECTION_ID_PREFIX: &[u8] = b"conn_";
const SEQUENCE_DIGITS: usize = 16;
const NONCE_DIGITS: usize = 8;
const CONNECTION_ID_LEN: usize = CONNECTION_ID_PREFIX.len() + SEQUENCE_DIGITS + NONCE_DIGITS;
const HEX_CHARS: &[u8] = b"0123456789abcdef";

/// Connection ID: 29-byte fixed array ("conn_" + 16 hex sequence + 8 hex nonce)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId {
    bytes: [u8; CONNECTION_ID_LEN],
    len: u8,
}

impl ConnectionId {
    /// Build the id for the `sequence`-th connection of this process.
    /// Distinct sequences never produce equal ids; the random nonce only
    /// keeps ids from being guessable.
    pub fn issue(sequence: u64) -> Self {
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        let prefix_len = CONNECTION_ID_PREFIX.len();
        bytes[..prefix_len].copy_from_slice(CONNECTION_ID_PREFIX);

        write_hex(&mut bytes[prefix_len..prefix_len + SEQUENCE_DIGITS], sequence);
        let nonce: u32 = rand::rng().random();
        write_hex(&mut bytes[prefix_len + SEQUENCE_DIGITS..], u64::from(nonce));

        Self {
            bytes,
            len: CONNECTION_ID_LEN as u8,
        }
    }

    /// Parse an address supplied by a client. Strings that no connection could
    /// carry (empty or longer than an id) yield `None` instead of truncating.
    pub fn parse(s: &str) -> Option<Self> {
        let src = s.as_bytes();
        if src.is_empty() || src.len() > CONNECTION_ID_LEN {
            return None;
        }
        let mut bytes = [0u8; CONNECTION_ID_LEN];
        bytes[..src.len()].copy_from_slice(src);
        Some(Self {
            bytes,
            len: src.len() as u8,
        })
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

/// Fill `out` with the low `out.len()` hex digits of `value`, most significant first.
fn write_hex(out: &mut [u8], value: u64) {
    let digits = out.len();
    for (i, byte) in out.iter_mut().enumerate() {
        let shift = (digits - 1 - i) * 4;
        *byte = HEX_CHARS[((value >> shift) & 0xF) as usize];
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ConnectionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ConnectionId::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid connection id: {s}")))
    }
}

/// Session identifier chosen by the host. Opaque: never generated, truncated
/// or validated by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Wrapper for outbound WebSocket messages using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Get the inner Utf8Bytes for tungstenite Message::Text
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_issue_has_correct_format() {
        let id = ConnectionId::issue(7);
        assert!(id.as_str().starts_with("conn_0000000000000007"));
        assert_eq!(id.as_str().len(), 29);
        assert!(id.as_str()[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn connection_id_encodes_full_sequence() {
        let id = ConnectionId::issue(u64::MAX);
        assert_eq!(&id.as_str()[5..21], "ffffffffffffffff");
        assert_ne!(ConnectionId::issue(1), ConnectionId::issue(1 << 32));
    }

    #[test]
    fn connection_id_parse_round_trips_issued_ids() {
        let id = ConnectionId::issue(42);
        assert_eq!(ConnectionId::parse(id.as_str()), Some(id));
    }

    #[test]
    fn connection_id_parse_accepts_short_ids() {
        let id = ConnectionId::parse("conn_1234abcd").unwrap();
        assert_eq!(id.as_str(), "conn_1234abcd");
        assert_eq!(ConnectionId::parse("a").unwrap().as_str(), "a");
    }

    #[test]
    fn connection_id_parse_rejects_empty_and_long() {
        assert!(ConnectionId::parse("").is_none());
        assert!(ConnectionId::parse("conn_0123456789abcdef01234567x").is_none());
    }

    #[test]
    fn connection_id_display() {
        let id = ConnectionId::parse("conn_abcd1234").unwrap();
        assert_eq!(format!("{}", id), "conn_abcd1234");
    }

    #[test]
    fn connection_id_serialization() {
        let id = ConnectionId::parse("conn_test1234").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"conn_test1234\"");
    }

    #[test]
    fn connection_id_deserialization_rejects_long_ids() {
        let result: Result<ConnectionId, _> =
            serde_json::from_str("\"conn_this_is_far_too_long_for_an_id\"");
        assert!(result.is_err());
    }

    #[test]
    fn session_id_is_not_truncated() {
        let long = "a-session-id-that-is-much-longer-than-a-room-code";
        let id = SessionId::from(long);
        assert_eq!(id.as_str(), long);
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{long}\""));
    }

    #[test]
    fn session_not_found_renders_human_message() {
        let err = SignalingError::SessionNotFound(SessionId::from("nope"));
        assert_eq!(err.to_string(), "Session not found");
    }

    #[test]
    fn connection_id_is_copy() {
        let id = ConnectionId::issue(3);
        let copy = id;
        assert_eq!(id.as_str(), copy.as_str());
    }
}
