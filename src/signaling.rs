//! WebSocket rendezvous and relay for host/viewer sessions

mod actor;
mod messages;
mod registry;
mod server;
mod transport;
mod types;

pub use actor::{RegistryHandle, RegistryStats};
pub use messages::{ClientMessage, ServerMessage, Signal};
pub use registry::{Registry, Session, relay};
pub use server::SignalingServer;
pub use transport::{Connections, Transport};
pub use types::{ConnectionId, OutboundMessage, SessionId, SignalingError};
