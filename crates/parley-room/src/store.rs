//! Persistence boundary and the per-room exclusion lock.
//!
//! [`RoomStore`] is the seam to whatever document store backs the rooms.
//! Parley ships [`MemoryStore`]; anything else implements the same trait.
//!
//! The store itself has no notion of concurrent writers. Every
//! read-modify-write of a room happens while holding that room's lock
//! from [`RoomLocks`], so two requests against one room are serialized
//! while requests against different rooms never wait on each other.

use std::sync::Arc;

use dashmap::DashMap;
use parley_protocol::{ChannelId, ChatMessage, MemberId, RoomId, RoomStatus};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{Member, Room, StoreError};

// ---------------------------------------------------------------------------
// RoomStore
// ---------------------------------------------------------------------------

/// Load, save and delete rooms, member records and chat messages.
///
/// Implementations must be cheap to call from async code: they are called
/// while a room lock is held, so they should not block for long.
pub trait RoomStore: Send + Sync + 'static {
    fn load(&self, id: &RoomId) -> Result<Option<Room>, StoreError>;

    /// Finds the room that owns `channel`, as main channel or sub-channel.
    fn load_by_channel(&self, channel: &ChannelId) -> Result<Option<Room>, StoreError>;

    /// Inserts or replaces the room with the same id.
    fn save(&self, room: &Room) -> Result<(), StoreError>;

    fn delete(&self, id: &RoomId) -> Result<(), StoreError>;

    /// Every stored room, in no particular order.
    fn rooms(&self) -> Result<Vec<Room>, StoreError>;

    fn rooms_with_status(&self, status: RoomStatus) -> Result<Vec<Room>, StoreError> {
        Ok(self
            .rooms()?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    fn save_member(&self, member: &Member) -> Result<(), StoreError>;

    fn find_member(&self, id: &MemberId) -> Result<Option<Member>, StoreError>;

    fn delete_member(&self, id: &MemberId) -> Result<(), StoreError>;

    fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError>;

    /// Stored messages of a channel in the order they were appended.
    fn messages(&self, channel: &ChannelId) -> Result<Vec<ChatMessage>, StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// An in-process [`RoomStore`] on concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rooms: DashMap<RoomId, Room>,
    /// Main and sub-channel ids to the owning room.
    channels: DashMap<ChannelId, RoomId>,
    members: DashMap<MemberId, Member>,
    messages: DashMap<ChannelId, Vec<ChatMessage>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the channel index entries of room `id` and returns the
    /// channels it owned.
    fn unindex(&self, id: &RoomId) -> Vec<ChannelId> {
        let owned: Vec<ChannelId> = self
            .channels
            .iter()
            .filter(|entry| entry.value() == id)
            .map(|entry| entry.key().clone())
            .collect();
        for channel in &owned {
            self.channels.remove(channel);
        }
        owned
    }
}

impl RoomStore for MemoryStore {
    fn load(&self, id: &RoomId) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.get(id).map(|r| r.value().clone()))
    }

    fn load_by_channel(&self, channel: &ChannelId) -> Result<Option<Room>, StoreError> {
        let Some(id) = self.channels.get(channel).map(|id| id.value().clone()) else {
            return Ok(None);
        };
        self.load(&id)
    }

    fn save(&self, room: &Room) -> Result<(), StoreError> {
        self.channels.insert(room.channel_id.clone(), room.id.clone());
        for sub in room.sub_rooms() {
            self.channels.insert(sub.sub_channel_id.clone(), room.id.clone());
        }
        self.rooms.insert(room.id.clone(), room.clone());
        Ok(())
    }

    fn delete(&self, id: &RoomId) -> Result<(), StoreError> {
        self.rooms.remove(id);
        for channel in self.unindex(id) {
            self.messages.remove(&channel);
        }
        Ok(())
    }

    fn rooms(&self) -> Result<Vec<Room>, StoreError> {
        Ok(self.rooms.iter().map(|r| r.value().clone()).collect())
    }

    fn save_member(&self, member: &Member) -> Result<(), StoreError> {
        self.members.insert(member.member_id.clone(), member.clone());
        Ok(())
    }

    fn find_member(&self, id: &MemberId) -> Result<Option<Member>, StoreError> {
        Ok(self.members.get(id).map(|m| m.value().clone()))
    }

    fn delete_member(&self, id: &MemberId) -> Result<(), StoreError> {
        self.members.remove(id);
        Ok(())
    }

    fn append_message(&self, message: &ChatMessage) -> Result<(), StoreError> {
        self.messages
            .entry(message.channel_id.clone())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    fn messages(&self, channel: &ChannelId) -> Result<Vec<ChatMessage>, StoreError> {
        Ok(self
            .messages
            .get(channel)
            .map(|m| m.value().clone())
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// RoomLocks
// ---------------------------------------------------------------------------

/// One async mutex per room.
///
/// Cloning yields another handle to the same table.
#[derive(Debug, Clone, Default)]
pub struct RoomLocks {
    locks: Arc<DashMap<RoomId, Arc<Mutex<()>>>>,
}

impl RoomLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `room`.
    pub async fn lock(&self, room: &RoomId) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the map shard is not held across `.await`.
        let mutex = Arc::clone(self.locks.entry(room.clone()).or_default().value());
        mutex.lock_owned().await
    }

    /// Drops the lock entry of a deleted room.
    ///
    /// Holders of a guard keep the old mutex alive until they release it.
    pub fn forget(&self, room: &RoomId) {
        self.locks.remove(room);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use parley_protocol::{ChatMode, Role};

    use super::*;
    use crate::Participant;

    fn room() -> Room {
        Room::new(
            "Free talk".into(),
            String::new(),
            ChatMode::Free,
            4,
            30.0,
            None,
            MemberId::generate(),
        )
    }

    fn message(channel: &ChannelId) -> ChatMessage {
        ChatMessage {
            id: parley_protocol::MessageId::generate(),
            channel_id: channel.clone(),
            kind: "CHAT".into(),
            sender: "amy".into(),
            message: "hello".into(),
            reply_to: None,
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_load_by_channel_finds_sub_channels() {
        let store = MemoryStore::new();
        let mut room = room();
        let sub = room.insert_participant(Participant::new(
            MemberId::generate(),
            Role::from("artist"),
            parley_protocol::ParticipantStatus::Pending,
            "amy".into(),
        ));
        store.save(&room).unwrap();

        let by_main = store.load_by_channel(&room.channel_id).unwrap().unwrap();
        let by_sub = store.load_by_channel(&sub).unwrap().unwrap();
        assert_eq!(by_main.id, room.id);
        assert_eq!(by_sub.id, room.id);
    }

    #[test]
    fn test_delete_drops_channel_index() {
        let store = MemoryStore::new();
        let room = room();
        store.save(&room).unwrap();
        store.delete(&room.id).unwrap();

        assert!(store.load(&room.id).unwrap().is_none());
        assert!(store.load_by_channel(&room.channel_id).unwrap().is_none());
    }

    #[test]
    fn test_delete_purges_channel_messages() {
        let store = MemoryStore::new();
        let mut room = room();
        let sub = room.insert_participant(Participant::new(
            MemberId::generate(),
            Role::from("artist"),
            parley_protocol::ParticipantStatus::Pending,
            "amy".into(),
        ));
        store.save(&room).unwrap();
        for channel in [&room.channel_id, &sub] {
            store.append_message(&message(channel)).unwrap();
        }

        store.delete(&room.id).unwrap();

        assert!(store.messages(&room.channel_id).unwrap().is_empty());
        assert!(store.messages(&sub).unwrap().is_empty());
        assert!(store.messages.is_empty());
    }

    #[test]
    fn test_rooms_with_status_filters() {
        let store = MemoryStore::new();
        let created = room();
        let mut started = room();
        started.status = RoomStatus::Started;
        store.save(&created).unwrap();
        store.save(&started).unwrap();

        let found = store.rooms_with_status(RoomStatus::Started).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, started.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_room_lock_serializes_same_room() {
        let locks = RoomLocks::new();
        let id = RoomId::from("r1");

        let guard = locks.lock(&id).await;
        let contender = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn test_room_lock_does_not_block_other_rooms() {
        let locks = RoomLocks::new();
        let _a = locks.lock(&RoomId::from("a")).await;
        let _b = locks.lock(&RoomId::from("b")).await;
        assert_eq!(locks.len(), 2);

        locks.forget(&RoomId::from("a"));
        assert_eq!(locks.len(), 1);
    }
}
