//! The session registry: who is listening where, and as whom.
//!
//! Connection events (subscribe, unsubscribe, socket close) arrive from
//! many independent tasks at once. The registry is backed by
//! [`DashMap`], a sharded concurrent map, so callers never lock anything
//! themselves and two sessions only contend when they hash to the same
//! shard.
//!
//! # Concurrency note
//!
//! The registry keeps a forward index (session → topics) and a reverse
//! index (topic → sessions) for publish fan-out. The two are updated one
//! after the other, never while holding a guard into the other map, so
//! there is no lock-order cycle between them.
//!
//! `bind` writes the forward index first and re-checks it after writing
//! the reverse one, so a `drop_session` racing it cannot leave a reverse
//! entry behind. Binds for one session are expected to come from its own
//! connection task, one at a time.

use std::collections::HashSet;

use dashmap::DashMap;
use parley_protocol::{SessionId, Topic};

use crate::SessionError;

/// Tracks per-connection subscriptions and nicknames.
///
/// ## Lifecycle
///
/// ```text
/// bind(s, t, nick) ──→ is_bound(s, t) == true
///        │
///        ├── unbind(s, t) ──→ is_bound(s, t) == false
///        │
///        └── drop_session(s) ──→ every is_bound(s, _) == false,
///                                nickname_of(s) == None
/// ```
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Topics each session is subscribed to.
    bindings: DashMap<SessionId, HashSet<Topic>>,

    /// Sessions subscribed to each topic. Mirror of `bindings`.
    subscribers: DashMap<Topic, HashSet<SessionId>>,

    /// The nickname a session speaks as, once it has bound one.
    nicknames: DashMap<SessionId, String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `session` to `topic`, recording `nickname` if given.
    ///
    /// A later nickname replaces an earlier one; binding without a
    /// nickname leaves the recorded one alone.
    pub fn bind(&self, session: SessionId, topic: Topic, nickname: Option<&str>) {
        if let Some(nickname) = nickname {
            self.nicknames.insert(session, nickname.to_owned());
        }

        self.bindings
            .entry(session)
            .or_default()
            .insert(topic.clone());

        tracing::trace!(%session, %topic, "topic bound");
        self.subscribers
            .entry(topic.clone())
            .or_default()
            .insert(session);

        // A `drop_session` that ran between the two inserts has already
        // swept the reverse index and missed this entry.
        if !self.is_bound(session, &topic) {
            self.forget_subscriber(&topic, session);
        }
    }

    /// Removes one subscription. Returns `true` if it existed.
    pub fn unbind(&self, session: SessionId, topic: &Topic) -> bool {
        let removed = self
            .bindings
            .get_mut(&session)
            .is_some_and(|mut topics| topics.remove(topic));

        if removed {
            self.forget_subscriber(topic, session);
            tracing::trace!(%session, %topic, "topic unbound");
        }
        removed
    }

    pub fn is_bound(&self, session: SessionId, topic: &Topic) -> bool {
        self.bindings
            .get(&session)
            .is_some_and(|topics| topics.contains(topic))
    }

    /// Like [`is_bound`](Self::is_bound) but as a `Result`, for request
    /// paths that require a subscription.
    ///
    /// # Errors
    /// [`SessionError::NotBound`] if the subscription is missing.
    pub fn require_bound(&self, session: SessionId, topic: &Topic) -> Result<(), SessionError> {
        if self.is_bound(session, topic) {
            Ok(())
        } else {
            Err(SessionError::NotBound {
                session,
                topic: topic.clone(),
            })
        }
    }

    /// Removes every binding and the nickname of `session`.
    ///
    /// Returns the topics the session was subscribed to, so the caller can
    /// react to what the connection was doing when it went away.
    pub fn drop_session(&self, session: SessionId) -> Vec<Topic> {
        let topics = self
            .bindings
            .remove(&session)
            .map(|(_, topics)| topics.into_iter().collect::<Vec<_>>())
            .unwrap_or_default();

        for topic in &topics {
            self.forget_subscriber(topic, session);
        }
        self.nicknames.remove(&session);

        tracing::debug!(%session, topics = topics.len(), "session dropped");
        topics
    }

    pub fn nickname_of(&self, session: SessionId) -> Option<String> {
        self.nicknames.get(&session).map(|n| n.value().clone())
    }

    /// The nickname of `session`, or an error if it never bound one.
    ///
    /// # Errors
    /// [`SessionError::NoNickname`].
    pub fn require_nickname(&self, session: SessionId) -> Result<String, SessionError> {
        self.nickname_of(session)
            .ok_or(SessionError::NoNickname(session))
    }

    /// Reverse lookup from nickname to session.
    ///
    /// This is a full scan. Nicknames are only unique within a room, so if
    /// two rooms share one the first session found wins.
    pub fn session_of(&self, nickname: &str) -> Option<SessionId> {
        self.nicknames
            .iter()
            .find(|entry| entry.value() == nickname)
            .map(|entry| *entry.key())
    }

    /// Topics `session` is currently subscribed to.
    pub fn topics_of(&self, session: SessionId) -> Vec<Topic> {
        self.bindings
            .get(&session)
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Sessions currently subscribed to `topic`.
    pub fn subscribers(&self, topic: &Topic) -> Vec<SessionId> {
        self.subscribers
            .get(topic)
            .map(|sessions| sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of sessions with at least one binding.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    fn forget_subscriber(&self, topic: &Topic, session: SessionId) {
        // `remove_if` re-checks emptiness under the shard lock, so a
        // concurrent `bind` to the same topic is never lost.
        if let Some(mut sessions) = self.subscribers.get_mut(topic) {
            sessions.remove(&session);
        }
        self.subscribers
            .remove_if(topic, |_, sessions| sessions.is_empty());
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parley_protocol::{ChannelId, RoomId};

    use super::*;

    fn sid(n: u64) -> SessionId {
        SessionId(n)
    }

    fn chat(ch: &str) -> Topic {
        Topic::Chat(ChannelId::from(ch))
    }

    // =====================================================================
    // bind / unbind / is_bound
    // =====================================================================

    #[test]
    fn test_bind_then_is_bound_true() {
        let reg = SessionRegistry::new();
        reg.bind(sid(1), chat("c1"), Some("amy"));

        assert!(reg.is_bound(sid(1), &chat("c1")));
        assert!(!reg.is_bound(sid(1), &chat("c2")));
        assert!(!reg.is_bound(sid(2), &chat("c1")));
        assert_eq!(reg.nickname_of(sid(1)).as_deref(), Some("amy"));
    }

    #[test]
    fn test_bind_without_nickname_keeps_existing() {
        let reg = SessionRegistry::new();
        reg.bind(sid(1), chat("c1"), Some("amy"));
        reg.bind(sid(1), Topic::Error, None);

        assert_eq!(reg.nickname_of(sid(1)).as_deref(), Some("amy"));
    }

    #[test]
    fn test_unbind_removes_only_that_topic() {
        let reg = SessionRegistry::new();
        reg.bind(sid(1), chat("c1"), None);
        reg.bind(sid(1), chat("c2"), None);

        assert!(reg.unbind(sid(1), &chat("c1")));
        assert!(!reg.is_bound(sid(1), &chat("c1")));
        assert!(reg.is_bound(sid(1), &chat("c2")));
        assert!(reg.subscribers(&chat("c1")).is_empty());
    }

    #[test]
    fn test_unbind_unknown_returns_false() {
        let reg = SessionRegistry::new();
        assert!(!reg.unbind(sid(9), &Topic::Error));
    }

    #[test]
    fn test_require_bound_missing_returns_not_bound() {
        let reg = SessionRegistry::new();
        let topic = Topic::Progress(RoomId::from("r1"));

        let err = reg.require_bound(sid(1), &topic).unwrap_err();
        assert!(matches!(err, SessionError::NotBound { session, .. } if session == sid(1)));

        reg.bind(sid(1), topic.clone(), None);
        assert!(reg.require_bound(sid(1), &topic).is_ok());
    }

    // =====================================================================
    // drop_session
    // =====================================================================

    #[test]
    fn test_drop_session_clears_all_bindings_and_nickname() {
        let reg = SessionRegistry::new();
        reg.bind(sid(1), chat("c1"), Some("amy"));
        reg.bind(sid(1), Topic::Roster(RoomId::from("r1")), None);

        let mut topics = reg.drop_session(sid(1));
        topics.sort_by_key(|t| t.to_string());

        assert_eq!(topics.len(), 2);
        assert!(!reg.is_bound(sid(1), &chat("c1")));
        assert!(reg.nickname_of(sid(1)).is_none());
        assert!(reg.session_of("amy").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn test_drop_session_unknown_returns_empty() {
        let reg = SessionRegistry::new();
        assert!(reg.drop_session(sid(42)).is_empty());
    }

    // =====================================================================
    // Lookups
    // =====================================================================

    #[test]
    fn test_session_of_finds_by_nickname() {
        let reg = SessionRegistry::new();
        reg.bind(sid(1), chat("c1"), Some("amy"));
        reg.bind(sid(2), chat("c1"), Some("bob"));

        assert_eq!(reg.session_of("bob"), Some(sid(2)));
        assert_eq!(reg.session_of("zed"), None);
    }

    #[test]
    fn test_subscribers_lists_every_bound_session() {
        let reg = SessionRegistry::new();
        reg.bind(sid(1), chat("c1"), None);
        reg.bind(sid(2), chat("c1"), None);
        reg.bind(sid(3), chat("c2"), None);

        let mut subs = reg.subscribers(&chat("c1"));
        subs.sort_by_key(|s| s.0);
        assert_eq!(subs, vec![sid(1), sid(2)]);
    }

    #[test]
    fn test_require_nickname_without_bind_fails() {
        let reg = SessionRegistry::new();
        reg.bind(sid(1), Topic::Error, None);

        assert!(matches!(
            reg.require_nickname(sid(1)),
            Err(SessionError::NoNickname(s)) if s == sid(1)
        ));
    }

    // =====================================================================
    // Concurrency
    // =====================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_bind_and_drop_leave_no_residue() {
        let reg = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();

        for n in 0..64 {
            let reg = Arc::clone(&reg);
            handles.push(tokio::spawn(async move {
                let nick = format!("user-{n}");
                reg.bind(sid(n), chat("shared"), Some(&nick));
                reg.bind(sid(n), Topic::Error, None);
                if n % 2 == 0 {
                    reg.drop_session(sid(n));
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(reg.len(), 32);
        assert_eq!(reg.subscribers(&chat("shared")).len(), 32);
        for n in (0..64).step_by(2) {
            assert!(!reg.is_bound(sid(n), &chat("shared")));
        }
    }

    #[test]
    fn test_bind_racing_drop_session_keeps_indexes_in_step() {
        let reg = Arc::new(SessionRegistry::new());
        let topic = chat("contested");

        for round in 0..200 {
            let session = sid(round);
            let binder = {
                let reg = Arc::clone(&reg);
                let topic = topic.clone();
                std::thread::spawn(move || reg.bind(session, topic, None))
            };
            let dropper = {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    reg.drop_session(session);
                })
            };
            binder.join().unwrap();
            dropper.join().unwrap();

            let listed = reg.subscribers(&topic).contains(&session);
            assert_eq!(listed, reg.is_bound(session, &topic), "round {round}");
        }
    }
}
