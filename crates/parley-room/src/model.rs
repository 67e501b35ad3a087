//! The Room aggregate and its parts.
//!
//! A [`Room`] owns two views of its members: the flat `participants` list
//! and the per-role [`SubRoom`]s. The sub-room lists are a denormalized
//! copy and must always equal `participants` grouped by role. Both lists
//! are private; every mutation goes through a `Room` method that updates
//! the two together.

use chrono::{DateTime, Utc};
use parley_protocol::{
    ChannelId, ChatMode, DebateSettings, MemberId, ParticipantStatus, Role,
    RosterEntry, RoomId, RoomStatus, Team, VoteResult,
};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Participant / SubRoom / Member
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub member_id: MemberId,
    pub role: Role,
    pub status: ParticipantStatus,
    pub nickname: String,
    /// Set only while `status` is `DISCONNECTED`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disconnected_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn new(member_id: MemberId, role: Role, status: ParticipantStatus, nickname: String) -> Self {
        Self {
            member_id,
            role,
            status,
            nickname,
            disconnected_at: None,
        }
    }

    pub fn is_disconnected(&self) -> bool {
        self.status == ParticipantStatus::Disconnected
    }
}

/// A per-role chat group inside a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubRoom {
    pub sub_channel_id: ChannelId,
    #[serde(rename = "type")]
    pub role: Role,
    participants: Vec<Participant>,
}

impl SubRoom {
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    fn contains(&self, member_id: &MemberId) -> bool {
        self.participants.iter().any(|p| &p.member_id == member_id)
    }
}

/// An identity record. The owner's is written at room creation, the
/// others on join; it is deleted on eviction or join rollback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub member_id: MemberId,
    pub nickname: Option<String>,
}

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

/// Running vote tally of a debate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub support: u32,
    pub opposite: u32,
    /// MVP nominations in the order they were cast.
    pub mvp: Vec<String>,
}

impl Vote {
    pub fn record(&mut self, team: Team, mvp: impl Into<String>) {
        match team {
            Team::Support => self.support += 1,
            Team::Opposite => self.opposite += 1,
        }
        self.mvp.push(mvp.into());
    }

    /// Final result. The MVP is the most nominated name; on a tie the one
    /// nominated first wins.
    pub fn tally(&self) -> VoteResult {
        let mut counts: Vec<(&str, u32)> = Vec::new();
        for name in &self.mvp {
            match counts.iter_mut().find(|entry| entry.0 == name.as_str()) {
                Some((_, count)) => *count += 1,
                None => counts.push((name.as_str(), 1)),
            }
        }

        let mut best: Option<(&str, u32)> = None;
        for (name, count) in counts {
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((name, count));
            }
        }

        VoteResult {
            support: self.support,
            opposite: self.opposite,
            mvp: best.map(|(name, _)| name.to_owned()),
        }
    }
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

/// One debate or free-discussion room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    /// Main chat topic of the room.
    pub channel_id: ChannelId,
    pub title: String,
    pub description: String,
    pub mode: ChatMode,
    /// Cap on support plus opposite. Spectators have their own cap.
    pub max_participants: u32,
    /// Total length in minutes.
    pub duration: f64,
    pub owner_id: MemberId,
    pub status: RoomStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debate_settings: Option<DebateSettings>,
    pub vote: Vote,
    participants: Vec<Participant>,
    sub_rooms: Vec<SubRoom>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Head-count of a room by fixed role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleCounts {
    pub support: u32,
    pub opposite: u32,
    pub spectator: u32,
}

impl Room {
    /// A freshly created room: `CREATED`, no participants, no sub-rooms.
    pub fn new(
        title: String,
        description: String,
        mode: ChatMode,
        max_participants: u32,
        duration: f64,
        debate_settings: Option<DebateSettings>,
        owner_id: MemberId,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: RoomId::generate(),
            channel_id: ChannelId::generate(),
            title,
            description,
            mode,
            max_participants,
            duration,
            owner_id,
            status: RoomStatus::Created,
            debate_settings,
            vote: Vote::default(),
            participants: Vec::new(),
            sub_rooms: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // -- Reads --

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn sub_rooms(&self) -> &[SubRoom] {
        &self.sub_rooms
    }

    pub fn participant(&self, member_id: &MemberId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.member_id == member_id)
    }

    pub fn participant_by_nickname(&self, nickname: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.nickname == nickname)
    }

    pub fn owner(&self) -> Option<&Participant> {
        self.participant(&self.owner_id)
    }

    pub fn sub_room_for(&self, role: &Role) -> Option<&SubRoom> {
        self.sub_rooms.iter().find(|s| &s.role == role)
    }

    pub fn sub_room_by_channel(&self, channel: &ChannelId) -> Option<&SubRoom> {
        self.sub_rooms.iter().find(|s| &s.sub_channel_id == channel)
    }

    /// `true` if `channel` is the main channel or one of the sub-channels.
    pub fn owns_channel(&self, channel: &ChannelId) -> bool {
        &self.channel_id == channel || self.sub_room_by_channel(channel).is_some()
    }

    pub fn count_role(&self, role: &Role) -> u32 {
        self.participants.iter().filter(|p| &p.role == role).count() as u32
    }

    pub fn role_counts(&self) -> RoleCounts {
        RoleCounts {
            support: self.count_role(&Role::Support),
            opposite: self.count_role(&Role::Opposite),
            spectator: self.count_role(&Role::Spectator),
        }
    }

    /// Participants that are not `DISCONNECTED`.
    pub fn active_count(&self) -> usize {
        self.participants.iter().filter(|p| !p.is_disconnected()).count()
    }

    pub fn roster(&self) -> Vec<RosterEntry> {
        self.participants
            .iter()
            .map(|p| RosterEntry {
                nickname: p.nickname.clone(),
                role: p.role.clone(),
                status: p.status,
            })
            .collect()
    }

    /// Checks that every participant sits in exactly the sub-room of its
    /// role with an identical record, and that sub-rooms hold nobody else.
    pub fn is_consistent(&self) -> bool {
        let mirrored: usize = self.sub_rooms.iter().map(|s| s.participants.len()).sum();
        mirrored == self.participants.len()
            && self.participants.iter().all(|p| {
                let mut homes = self.sub_rooms.iter().filter(|s| s.contains(&p.member_id));
                match (homes.next(), homes.next()) {
                    (Some(sub), None) => {
                        sub.role == p.role && sub.participants.iter().any(|q| q == p)
                    }
                    _ => false,
                }
            })
    }

    // -- Mutations --

    /// Adds a participant and mirrors it into the sub-room of its role,
    /// creating that sub-room if needed. Returns the sub-channel id.
    pub(crate) fn insert_participant(&mut self, participant: Participant) -> ChannelId {
        let sub = self.sub_room_entry(&participant.role);
        sub.participants.push(participant.clone());
        let channel = sub.sub_channel_id.clone();
        self.participants.push(participant);
        self.touch();
        channel
    }

    /// Removes a participant from the room and from its sub-room.
    pub(crate) fn remove_participant(&mut self, member_id: &MemberId) -> Option<Participant> {
        let index = self.participants.iter().position(|p| &p.member_id == member_id)?;
        let removed = self.participants.remove(index);
        for sub in &mut self.sub_rooms {
            sub.participants.retain(|p| &p.member_id != member_id);
        }
        self.touch();
        Some(removed)
    }

    /// Moves a participant to `role`, keeping its status. Returns the
    /// sub-channel it left and the one it landed in.
    pub(crate) fn change_role(
        &mut self,
        member_id: &MemberId,
        role: Role,
    ) -> Option<(ChannelId, ChannelId)> {
        let participant = self.participants.iter_mut().find(|p| &p.member_id == member_id)?;
        participant.role = role.clone();
        let moved = participant.clone();

        let mut origin = None;
        for sub in &mut self.sub_rooms {
            let before = sub.participants.len();
            sub.participants.retain(|p| &p.member_id != member_id);
            if sub.participants.len() != before {
                origin = Some(sub.sub_channel_id.clone());
            }
        }

        let target = self.sub_room_entry(&role);
        target.participants.push(moved);
        let target_channel = target.sub_channel_id.clone();
        self.touch();

        origin.map(|origin| (origin, target_channel))
    }

    /// Sets a participant's status in both views. `disconnected_at` is
    /// stamped when moving to `DISCONNECTED` and cleared otherwise.
    pub(crate) fn set_status(
        &mut self,
        member_id: &MemberId,
        status: ParticipantStatus,
        at: DateTime<Utc>,
    ) -> Option<&Participant> {
        let disconnected_at = (status == ParticipantStatus::Disconnected).then_some(at);
        let apply = |p: &mut Participant| {
            p.status = status;
            p.disconnected_at = disconnected_at;
        };

        for sub in &mut self.sub_rooms {
            if let Some(p) = sub.participants.iter_mut().find(|p| &p.member_id == member_id) {
                apply(p);
            }
        }
        let participant = self.participants.iter_mut().find(|p| &p.member_id == member_id)?;
        apply(participant);
        self.updated_at = at;
        self.participant(member_id)
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn sub_room_entry(&mut self, role: &Role) -> &mut SubRoom {
        let index = match self.sub_rooms.iter().position(|s| &s.role == role) {
            Some(index) => index,
            None => {
                self.sub_rooms.push(SubRoom {
                    sub_channel_id: ChannelId::generate(),
                    role: role.clone(),
                    participants: Vec::new(),
                });
                self.sub_rooms.len() - 1
            }
        };
        &mut self.sub_rooms[index]
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn debate_room() -> Room {
        Room::new(
            "Cats vs dogs".into(),
            String::new(),
            ChatMode::Debate,
            6,
            14.5,
            Some(DebateSettings::default()),
            MemberId::from("owner"),
        )
    }

    fn member(id: &str, role: Role) -> Participant {
        Participant::new(MemberId::from(id), role, ParticipantStatus::Pending, id.to_uppercase())
    }

    // =====================================================================
    // Vote tally
    // =====================================================================

    #[test]
    fn test_tally_counts_sides_and_picks_most_nominated() {
        let mut vote = Vote::default();
        vote.record(Team::Support, "alice");
        vote.record(Team::Opposite, "bob");
        vote.record(Team::Support, "alice");

        let result = vote.tally();
        assert_eq!(result.support, 2);
        assert_eq!(result.opposite, 1);
        assert_eq!(result.mvp.as_deref(), Some("alice"));
    }

    #[test]
    fn test_tally_tie_goes_to_first_nominated() {
        let mut vote = Vote::default();
        vote.record(Team::Support, "bob");
        vote.record(Team::Opposite, "alice");
        vote.record(Team::Support, "alice");
        vote.record(Team::Opposite, "bob");

        assert_eq!(vote.tally().mvp.as_deref(), Some("bob"));
    }

    #[test]
    fn test_tally_without_votes_has_no_mvp() {
        let result = Vote::default().tally();
        assert_eq!(result, VoteResult::default());
    }

    // =====================================================================
    // Mirror maintenance
    // =====================================================================

    #[test]
    fn test_insert_creates_sub_room_once_per_role() {
        let mut room = debate_room();
        let a = room.insert_participant(member("a", Role::Support));
        let b = room.insert_participant(member("b", Role::Support));
        let c = room.insert_participant(member("c", Role::Opposite));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(room.sub_rooms().len(), 2);
        assert!(room.is_consistent());
    }

    #[test]
    fn test_remove_clears_both_views() {
        let mut room = debate_room();
        room.insert_participant(member("a", Role::Support));

        let removed = room.remove_participant(&MemberId::from("a")).unwrap();
        assert_eq!(removed.nickname, "A");
        assert!(room.participants().is_empty());
        assert!(room.sub_room_for(&Role::Support).unwrap().participants().is_empty());
        assert!(room.is_consistent());
    }

    #[test]
    fn test_change_role_moves_between_sub_rooms() {
        let mut room = debate_room();
        let from = room.insert_participant(member("a", Role::Support));

        let (origin, target) = room
            .change_role(&MemberId::from("a"), Role::Opposite)
            .unwrap();

        assert_eq!(origin, from);
        assert_eq!(room.sub_room_for(&Role::Opposite).unwrap().sub_channel_id, target);
        assert_eq!(room.count_role(&Role::Support), 0);
        assert_eq!(room.count_role(&Role::Opposite), 1);
        assert!(room.is_consistent());
    }

    #[test]
    fn test_set_status_stamps_and_clears_disconnected_at() {
        let mut room = debate_room();
        room.insert_participant(member("a", Role::Spectator));
        let id = MemberId::from("a");
        let now = Utc::now();

        let p = room.set_status(&id, ParticipantStatus::Disconnected, now).unwrap();
        assert_eq!(p.disconnected_at, Some(now));
        assert!(room.is_consistent());

        let p = room.set_status(&id, ParticipantStatus::Ready, now).unwrap();
        assert_eq!(p.disconnected_at, None);
        assert!(room.is_consistent());
    }

    #[test]
    fn test_is_consistent_detects_stale_mirror() {
        let mut room = debate_room();
        room.insert_participant(member("a", Role::Support));
        // Bypass the mutation helpers to break the mirror.
        room.participants[0].status = ParticipantStatus::Ready;
        assert!(!room.is_consistent());
    }

    #[test]
    fn test_owns_channel_covers_main_and_sub_channels() {
        let mut room = debate_room();
        let sub = room.insert_participant(member("a", Role::Support));

        assert!(room.owns_channel(&room.channel_id.clone()));
        assert!(room.owns_channel(&sub));
        assert!(!room.owns_channel(&ChannelId::from("elsewhere")));
    }

    #[test]
    fn test_room_serializes_camel_case() {
        let room = debate_room();
        let json = serde_json::to_value(&room).unwrap();
        assert_eq!(json["status"], "CREATED");
        assert_eq!(json["maxParticipants"], 6);
        assert!(json["subRooms"].as_array().unwrap().is_empty());
    }
}
