//! The session registry. One [`Hub`] is shared by every connection; it
//! never touches a socket directly, only the bounded `mpsc` sender each
//! session installed on connect — matching the broadcast-bridge pattern
//! this module is grounded on, but keyed so a message can also be targeted
//! at one user rather than always fanned out to everyone.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::auth::UserId;
use crate::protocol::OutboundFrame;

/// Outbound channel capacity per session. A session that can't keep up is
/// disconnected rather than allowed to buffer unboundedly (non-blocking
/// backpressure policy).
pub const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

struct SessionHandle {
    user_id: UserId,
    sender: mpsc::Sender<OutboundFrame>,
}

#[derive(Default)]
pub struct Hub {
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: Uuid, user_id: UserId, sender: mpsc::Sender<OutboundFrame>) {
        self.sessions.write().insert(session_id, SessionHandle { user_id, sender });
    }

    pub fn unregister(&self, session_id: Uuid) {
        self.sessions.write().remove(&session_id);
    }

    /// Attempts a non-blocking send to one session. Returns `false` if the
    /// session is unknown or its outbound channel is full/closed. A full
    /// channel means the session can't keep up with its own subscription;
    /// rather than buffer unboundedly or block the sender, the session is
    /// unregistered here, which drops the last live `Sender` clone and lets
    /// the session's write pump observe a closed channel and wind down.
    pub fn send_to(&self, session_id: Uuid, frame: OutboundFrame) -> bool {
        let sender = {
            let sessions = self.sessions.read();
            match sessions.get(&session_id) {
                Some(handle) => handle.sender.clone(),
                None => return false,
            }
        };
        match sender.try_send(frame) {
            Ok(()) => true,
            Err(_) => {
                debug!(%session_id, "outbound channel full or closed, closing session");
                self.unregister(session_id);
                false
            }
        }
    }

    /// Sends to every session owned by `user_id` (a user may have more than
    /// one connection open at once).
    pub fn send_to_user(&self, user_id: UserId, frame: OutboundFrame) {
        let targets: Vec<Uuid> = {
            let sessions = self.sessions.read();
            sessions
                .iter()
                .filter(|(_, handle)| handle.user_id == user_id)
                .map(|(id, _)| *id)
                .collect()
        };
        for id in targets {
            self.send_to(id, frame.clone());
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_to_unknown_session_returns_false() {
        let hub = Hub::new();
        assert!(!hub.send_to(Uuid::new_v4(), OutboundFrame::Pong { id: None }));
    }

    #[tokio::test]
    async fn register_then_send_delivers_the_frame() {
        let hub = Hub::new();
        let (tx, mut rx) = mpsc::channel(4);
        let id = Uuid::new_v4();
        hub.register(id, UserId(1), tx);

        assert!(hub.send_to(id, OutboundFrame::Pong { id: None }));
        let received = rx.recv().await.unwrap();
        assert!(matches!(received, OutboundFrame::Pong { id: None }));
    }

    #[tokio::test]
    async fn unregister_removes_the_session() {
        let hub = Hub::new();
        let (tx, _rx) = mpsc::channel(4);
        let id = Uuid::new_v4();
        hub.register(id, UserId(1), tx);
        hub.unregister(id);
        assert!(!hub.send_to(id, OutboundFrame::Pong { id: None }));
    }
}
