//! Connection events: what happens when a session subscribes, leaves a
//! topic, or drops.

use std::collections::HashSet;

use parley_protocol::{Broadcast, RoomId, RoomStatus, SessionId, Topic};
use tracing::{debug, warn};

use crate::{RoomCoordinator, RoomError};

impl RoomCoordinator {
    /// Binds `session` to `topic` after checking the topic belongs to a
    /// live room.
    ///
    /// A chat subscription needs the subscriber's nickname and room id.
    /// If that nickname belongs to a disconnected participant, this is a
    /// reconnect.
    pub async fn on_subscribe(
        &self,
        session: SessionId,
        topic: Topic,
        nickname: Option<&str>,
        room_id: Option<&RoomId>,
    ) -> Result<(), RoomError> {
        let result = self.check_subscription(&topic, nickname, room_id);
        let reconnect = self.report("Subscription failed", result)?;

        self.registry.bind(session, topic.clone(), nickname);
        debug!(%session, %topic, "subscribed");

        if let (Some(room_id), Some(nickname)) = (reconnect, nickname) {
            self.presence.reconnect(&room_id, nickname).await?;
        }
        Ok(())
    }

    /// Validates the subscription. Returns the room to reconnect into, if
    /// the subscriber is a disconnected participant.
    fn check_subscription(
        &self,
        topic: &Topic,
        nickname: Option<&str>,
        room_id: Option<&RoomId>,
    ) -> Result<Option<RoomId>, RoomError> {
        match topic {
            Topic::Chat(channel) => {
                let (Some(nickname), Some(room_id)) = (nickname, room_id) else {
                    return Err(RoomError::InvalidRequest(
                        "chat subscriptions need a nickname and room id".into(),
                    ));
                };
                let room = self.load(room_id)?;
                if !room.owns_channel(channel) {
                    return Err(RoomError::InvalidChannel(channel.clone()));
                }
                let returning = room
                    .participant_by_nickname(nickname)
                    .is_some_and(|p| p.is_disconnected());
                Ok(returning.then(|| room.id.clone()))
            }
            Topic::Roster(room_id) | Topic::Progress(room_id) => {
                self.load(room_id)?;
                Ok(None)
            }
            Topic::Error => Ok(None),
        }
    }

    pub fn on_unsubscribe(&self, session: SessionId, topic: &Topic) {
        if self.registry.unbind(session, topic) {
            debug!(%session, %topic, "unsubscribed");
        }
    }

    /// Handles a dropped connection.
    ///
    /// Every room the session was chatting in marks its participant
    /// disconnected, then the session is forgotten.
    pub async fn on_session_closed(&self, session: SessionId) {
        let nickname = self.registry.nickname_of(session);
        let topics = self.registry.topics_of(session);

        if let Some(nickname) = nickname.as_deref() {
            let mut seen = HashSet::new();
            for topic in &topics {
                let Topic::Chat(channel) = topic else {
                    continue;
                };
                let room = match self.store.load_by_channel(channel) {
                    Ok(Some(room)) => room,
                    Ok(None) => continue,
                    Err(err) => {
                        warn!(%session, %channel, %err, "could not resolve room on disconnect");
                        continue;
                    }
                };
                if !seen.insert(room.id.clone()) || room.status == RoomStatus::Ended {
                    continue;
                }
                let present = room
                    .participant_by_nickname(nickname)
                    .is_some_and(|p| !p.is_disconnected());
                if !present {
                    continue;
                }
                if let Err(err) = self.presence.disconnect(&room.id, nickname).await {
                    warn!(%session, room_id = %room.id, %err, "disconnect handling failed");
                    self.publisher
                        .publish(&Topic::Error, Broadcast::error("Disconnect failed", err.to_string()));
                }
            }
        }

        let dropped = self.registry.drop_session(session);
        debug!(%session, topics = dropped.len(), "session closed");
    }
}
