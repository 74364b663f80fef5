use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use super::messages::{ClientMessage, ServerMessage, Signal};
use super::transport::Transport;
use super::types::{ConnectionId, SessionId, SignalingError};

/// One host and the viewers that joined it, in join order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    host: ConnectionId,
    viewers: Vec<ConnectionId>,
}

impl Session {
    fn new(host: ConnectionId) -> Self {
        Self {
            host,
            viewers: Vec::new(),
        }
    }

    pub fn host(&self) -> ConnectionId {
        self.host
    }

    pub fn viewers(&self) -> &[ConnectionId] {
        &self.viewers
    }

    pub fn viewer_count(&self) -> usize {
        self.viewers.len()
    }

    /// Broadcast group: host first, then viewers, each connection once.
    pub fn members(&self) -> Vec<ConnectionId> {
        let mut members = Vec::with_capacity(self.viewers.len() + 1);
        members.push(self.host);
        for viewer in &self.viewers {
            if !members.contains(viewer) {
                members.push(*viewer);
            }
        }
        members
    }
}

/// Every live session, plus a reverse index from connection to the sessions
/// it belongs to (as host or viewer).
///
/// The registry is not synchronized; it must be owned by a single task that
/// applies actions one at a time.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: HashMap<SessionId, Session>,
    memberships: HashMap<ConnectionId, HashSet<SessionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&self, session_id: &SessionId) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Sessions `id` currently participates in, sorted.
    pub fn sessions_of(&self, id: &ConnectionId) -> Vec<SessionId> {
        let mut sessions: Vec<SessionId> = self
            .memberships
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        sessions.sort();
        sessions
    }

    /// Apply one inbound action from `from`.
    pub fn handle<T: Transport>(
        &mut self,
        from: ConnectionId,
        message: ClientMessage,
        transport: &mut T,
    ) {
        match message {
            ClientMessage::CreateSession(session_id) => {
                self.create_session(session_id, from, transport);
            }
            ClientMessage::JoinSession(session_id) => {
                // the caller has already been told; nothing else to do
                let _ = self.join_session(session_id, from, transport);
            }
            ClientMessage::Offer { to, offer } => {
                relay(from, &to, Signal::Offer(offer), transport);
            }
            ClientMessage::Answer { to, answer } => {
                relay(from, &to, Signal::Answer(answer), transport);
            }
            ClientMessage::IceCandidate { to, candidate } => {
                relay(from, &to, Signal::IceCandidate(candidate), transport);
            }
            ClientMessage::EndSession(session_id) => {
                self.end_session(session_id, from, transport);
            }
        }
    }

    /// Register `host` as the host of a fresh session. An existing session
    /// with the same id is replaced without notifying its members.
    pub fn create_session<T: Transport>(
        &mut self,
        session_id: SessionId,
        host: ConnectionId,
        transport: &mut T,
    ) {
        if let Some(previous) = self.sessions.remove(&session_id) {
            warn!(
                "Session {} replaced: host {} -> {}, {} viewer(s) dropped",
                session_id,
                previous.host,
                host,
                previous.viewer_count()
            );
            self.forget(&session_id, &previous.members());
        }

        self.sessions.insert(session_id.clone(), Session::new(host));
        self.memberships
            .entry(host)
            .or_default()
            .insert(session_id.clone());

        info!("Session created: {} by {}", session_id, host);
        transport.send_to(host, &ServerMessage::SessionCreated(session_id));
    }

    /// Add `viewer` to an existing session and introduce it to the host.
    ///
    /// Returns the new viewer count. An unknown session is reported to the
    /// caller as an `error` message and leaves the registry untouched.
    pub fn join_session<T: Transport>(
        &mut self,
        session_id: SessionId,
        viewer: ConnectionId,
        transport: &mut T,
    ) -> Result<usize, SignalingError> {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            debug!("{} tried to join unknown session {}", viewer, session_id);
            let err = SignalingError::SessionNotFound(session_id);
            transport.send_to(viewer, &ServerMessage::Error(err.to_string()));
            return Err(err);
        };

        session.viewers.push(viewer);
        let host = session.host;
        let viewer_count = session.viewers.len();

        self.memberships
            .entry(viewer)
            .or_default()
            .insert(session_id.clone());

        info!(
            "{} joined session {} ({} viewer(s))",
            viewer, session_id, viewer_count
        );
        transport.send_to(
            host,
            &ServerMessage::ViewerJoined {
                viewer_id: viewer,
                viewer_count,
            },
        );
        transport.send_to(viewer, &ServerMessage::ReadyToConnect(host));

        Ok(viewer_count)
    }

    /// Tell every member the session is over and remove it. Any connection
    /// may end any session. Returns false if there was nothing to end.
    pub fn end_session<T: Transport>(
        &mut self,
        session_id: SessionId,
        caller: ConnectionId,
        transport: &mut T,
    ) -> bool {
        let Some(session) = self.sessions.remove(&session_id) else {
            debug!("{} tried to end unknown session {}", caller, session_id);
            return false;
        };

        let members = session.members();
        transport.send_to_group(members.iter().copied(), &ServerMessage::SessionEnded);
        self.forget(&session_id, &members);

        info!("Session ended: {} by {}", session_id, caller);
        true
    }

    /// Remove every trace of a closed connection.
    ///
    /// Sessions it hosted are torn down with `host-left` to their group;
    /// sessions it viewed lose it and the host receives the new viewer count.
    /// Returns the number of sessions touched.
    pub fn disconnect<T: Transport>(&mut self, id: ConnectionId, transport: &mut T) -> usize {
        let Some(joined) = self.memberships.remove(&id) else {
            return 0;
        };

        let mut joined: Vec<SessionId> = joined.into_iter().collect();
        joined.sort();

        let mut touched = 0;
        for session_id in joined {
            let Some(session) = self.sessions.get_mut(&session_id) else {
                continue;
            };
            touched += 1;

            if session.host == id {
                let members = session.members();
                transport.send_to_group(members.iter().copied(), &ServerMessage::HostLeft);
                self.sessions.remove(&session_id);
                self.forget(&session_id, &members);
                info!("Session {} closed: host {} left", session_id, id);
            } else {
                session.viewers.retain(|viewer| *viewer != id);
                let host = session.host;
                let viewer_count = session.viewers.len();
                transport.send_to(host, &ServerMessage::ViewerCountUpdate(viewer_count));
                info!(
                    "{} left session {} ({} viewer(s))",
                    id, session_id, viewer_count
                );
            }
        }

        touched
    }

    fn forget(&mut self, session_id: &SessionId, members: &[ConnectionId]) {
        for member in members {
            if let Some(joined) = self.memberships.get_mut(member) {
                joined.remove(session_id);
                if joined.is_empty() {
                    self.memberships.remove(member);
                }
            }
        }
    }
}

/// Forward a negotiation payload to `to` without looking at it. Targets that
/// cannot be a connection id are dropped like any other unreachable target.
pub fn relay<T: Transport>(from: ConnectionId, to: &str, signal: Signal, transport: &mut T) {
    match ConnectionId::parse(to) {
        Some(target) => {
            debug!("{} from {} to {}", signal.kind(), from, target);
            transport.send_to(target, &signal.into_message(from));
        }
        None => debug!("Dropping {} from {}: invalid target {:?}", signal.kind(), from, to),
    }
}
