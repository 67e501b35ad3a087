//! In-process topic relay.
//!
//! Each live connection owns an outbox. Publishing looks up the sessions
//! bound to a topic in the [`SessionRegistry`] and drops a frame into each
//! of their outboxes; the connection's writer task drains it onto the
//! socket.

use std::sync::Arc;

use dashmap::DashMap;
use parley_protocol::{Broadcast, SessionId, Topic};
use parley_room::Publisher;
use parley_session::SessionRegistry;
use tokio::sync::mpsc;

use crate::frames::ServerFrame;

pub struct Relay {
    registry: Arc<SessionRegistry>,
    outboxes: DashMap<SessionId, mpsc::UnboundedSender<ServerFrame>>,
}

impl Relay {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            registry,
            outboxes: DashMap::new(),
        }
    }

    /// Opens an outbox for `session` and returns its receiving end.
    ///
    /// Opening again replaces the previous outbox; its receiver sees the
    /// channel close.
    pub fn open(&self, session: SessionId) -> mpsc::UnboundedReceiver<ServerFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.outboxes.insert(session, tx);
        rx
    }

    pub fn close(&self, session: SessionId) {
        self.outboxes.remove(&session);
    }

    /// Queues `frame` for `session`. Returns `false` if the session has no
    /// open outbox or its writer is gone.
    pub fn send(&self, session: SessionId, frame: ServerFrame) -> bool {
        match self.outboxes.get(&session) {
            Some(outbox) => outbox.send(frame).is_ok(),
            None => false,
        }
    }

    pub fn connections(&self) -> usize {
        self.outboxes.len()
    }
}

impl Publisher for Relay {
    fn publish(&self, topic: &Topic, payload: Broadcast) {
        let subscribers = self.registry.subscribers(topic);
        let mut delivered = 0usize;
        for session in &subscribers {
            let frame = ServerFrame::Message {
                topic: topic.clone(),
                payload: payload.clone(),
            };
            if self.send(*session, frame) {
                delivered += 1;
            } else {
                tracing::debug!(%session, %topic, "subscriber has no open outbox");
            }
        }
        tracing::trace!(%topic, subscribers = subscribers.len(), delivered, "published");
    }
}

#[cfg(test)]
mod tests {
    use parley_protocol::RoomId;

    use super::*;

    fn relay() -> (Relay, Arc<SessionRegistry>) {
        let registry = Arc::new(SessionRegistry::new());
        (Relay::new(Arc::clone(&registry)), registry)
    }

    #[test]
    fn test_publish_reaches_only_bound_sessions() {
        let (relay, registry) = relay();
        let topic = Topic::Progress(RoomId::from("r1"));
        let mut bound = relay.open(SessionId(1));
        let mut other = relay.open(SessionId(2));
        registry.bind(SessionId(1), topic.clone(), None);

        relay.publish(&topic, Broadcast::error("t", "m"));

        match bound.try_recv() {
            Ok(ServerFrame::Message { topic: got, .. }) => assert_eq!(got, topic),
            other => panic!("expected a message frame, got {other:?}"),
        }
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn test_send_after_close_returns_false() {
        let (relay, _) = relay();
        let _rx = relay.open(SessionId(1));
        relay.close(SessionId(1));

        assert!(!relay.send(SessionId(1), ServerFrame::reply(1, Ok(serde_json::Value::Null))));
        assert_eq!(relay.connections(), 0);
    }

    #[test]
    fn test_publish_skips_bound_session_without_outbox() {
        let (relay, registry) = relay();
        registry.bind(SessionId(9), Topic::Error, None);

        relay.publish(&Topic::Error, Broadcast::error("t", "m"));

        assert_eq!(relay.connections(), 0);
    }
}
