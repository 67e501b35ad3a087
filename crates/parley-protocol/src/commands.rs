//! Inbound requests and their direct responses.
//!
//! Every request struct uses camelCase field names on the wire. Fields
//! named `type` in the JSON are renamed to something more specific in
//! Rust (`mode`, `kind`) because `type` is a keyword.
//!
//! [`Command`] wraps all of them in one `op`-tagged enum so a gateway can
//! decode a single frame shape and dispatch on the variant.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    ChannelId, ChatMode, MemberId, MessageId, ParticipantStatus, Role, RoomId,
    RoomStatus,
};

/// Minutes allotted to the voting phase of every debate.
pub const VOTING_MINUTES: f64 = 0.5;

// ---------------------------------------------------------------------------
// Debate settings
// ---------------------------------------------------------------------------

/// Per-phase durations of a debate, in minutes.
///
/// The voting phase is not configurable; see [`VOTING_MINUTES`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebateSettings {
    pub positive_entry: u32,
    pub negative_questioning: u32,
    pub negative_entry: u32,
    pub positive_questioning: u32,
    pub positive_rebuttal: u32,
    pub negative_rebuttal: u32,
}

impl DebateSettings {
    /// Total length of the debate in minutes, voting included.
    pub fn total_minutes(&self) -> f64 {
        let spoken = self.positive_entry
            + self.negative_questioning
            + self.negative_entry
            + self.positive_questioning
            + self.positive_rebuttal
            + self.negative_rebuttal;
        f64::from(spoken) + VOTING_MINUTES
    }
}

// ---------------------------------------------------------------------------
// Room creation and edits
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub max_participants: u32,
    #[serde(rename = "chatMode", alias = "mode")]
    pub mode: ChatMode,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub debate_settings: Option<DebateSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoomResponse {
    pub room_id: RoomId,
    pub owner_id: MemberId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifyDescriptionRequest {
    pub owner_id: MemberId,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSettingsRequest {
    pub owner_id: MemberId,
    pub max_participants: u32,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub debate_settings: Option<DebateSettings>,
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

/// A request to enter a room.
///
/// The owner passes the `owner_id` they were handed at creation; everyone
/// else omits it and is assigned a fresh member id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    #[serde(default)]
    pub nickname: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub owner_id: Option<MemberId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinResponse {
    pub room_id: RoomId,
    pub member_id: MemberId,
    pub channel_id: ChannelId,
    pub sub_channel_id: ChannelId,
    pub nickname: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamChangeRequest {
    pub role: Role,
    /// The sub-channel the caller believes it currently sits in.
    pub sub_channel_id: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamChangeResponse {
    pub room_id: RoomId,
    pub channel_id: ChannelId,
    pub new_sub_channel_id: ChannelId,
    pub origin_sub_channel_id: ChannelId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyRequest {
    #[serde(rename = "type")]
    pub mode: ChatMode,
    pub member_id: MemberId,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub owner_id: MemberId,
}

// ---------------------------------------------------------------------------
// Voting and chat
// ---------------------------------------------------------------------------

/// A vote cast during the voting phase.
///
/// `team` is kept as a raw string so an unknown value surfaces as a
/// validation error from the room, not as a frame decode failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    /// Must be `"VOTE"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub team: String,
    pub mvp: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    /// The room the destination channel belongs to.
    pub id: RoomId,
    /// For a sub-channel this must name the sub-channel's role. Ignored
    /// when the destination is the main channel.
    #[serde(rename = "type")]
    pub kind: String,
    pub sender: String,
    pub message: String,
    #[serde(default)]
    pub reply_to: Option<MessageId>,
}

// ---------------------------------------------------------------------------
// Subscription failure
// ---------------------------------------------------------------------------

/// Which optimistic mutation a failed client subscription should undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    EnterFailed,
    TeamChangeFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFailure {
    #[serde(rename = "type")]
    pub kind: FailureKind,
    pub member_id: MemberId,
    pub origin_role: Role,
    #[serde(default)]
    pub new_role: Option<Role>,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    CreatedAt,
    Participants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Filter, sort and page parameters for listing rooms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoomFilter {
    pub mode: Option<ChatMode>,
    pub status: Option<RoomStatus>,
    pub sort: SortKey,
    pub order: SortOrder,
    /// Zero-based page index.
    pub page: usize,
    pub size: usize,
}

impl Default for RoomFilter {
    fn default() -> Self {
        Self {
            mode: None,
            status: None,
            sort: SortKey::default(),
            order: SortOrder::default(),
            page: 0,
            size: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub id: RoomId,
    pub mode: ChatMode,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub owner_nickname: String,
    pub max_participants: u32,
    pub current_participants: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantCounts {
    /// Support plus opposite. Spectators do not count toward capacity.
    pub current_participants: u32,
    pub max_participants: u32,
    pub support: u32,
    pub opposite: u32,
    pub spectator: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomHome {
    pub title: String,
    pub description: String,
    pub mode: ChatMode,
    pub duration: f64,
    pub max_participants: u32,
}

// ---------------------------------------------------------------------------
// Command: everything a client can ask for
// ---------------------------------------------------------------------------

/// One client request, tagged by `op`.
///
/// Room-scoped operations carry `roomId` next to the flattened request
/// body, so a join looks like:
///
/// ```json
/// { "op": "join", "roomId": "…", "role": "support", "nickname": "amy" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    CreateRoom(CreateRoomRequest),
    Join {
        room_id: RoomId,
        #[serde(flatten)]
        request: JoinRequest,
    },
    TeamChange {
        room_id: RoomId,
        member_id: MemberId,
        #[serde(flatten)]
        request: TeamChangeRequest,
    },
    Ready {
        room_id: RoomId,
        #[serde(flatten)]
        request: ReadyRequest,
    },
    Vote {
        room_id: RoomId,
        #[serde(flatten)]
        request: VoteRequest,
    },
    SendMessage {
        channel_id: ChannelId,
        #[serde(flatten)]
        request: SendMessageRequest,
    },
    Start {
        room_id: RoomId,
        #[serde(flatten)]
        request: StartRequest,
    },
    SubscriptionFailed {
        room_id: RoomId,
        #[serde(flatten)]
        request: SubscriptionFailure,
    },
    ModifyDescription {
        room_id: RoomId,
        #[serde(flatten)]
        request: ModifyDescriptionRequest,
    },
    ChangeSettings {
        room_id: RoomId,
        #[serde(flatten)]
        request: ChangeSettingsRequest,
    },
    RoomInfo {
        room_id: RoomId,
    },
    ParticipantCounts {
        room_id: RoomId,
    },
    RoomHome {
        room_id: RoomId,
    },
    ListRooms(RoomFilter),
    PreviousMessages {
        channel_id: ChannelId,
    },
}

impl Command {
    /// The operation name, as it appears in the `op` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateRoom(_) => "createRoom",
            Command::Join { .. } => "join",
            Command::TeamChange { .. } => "teamChange",
            Command::Ready { .. } => "ready",
            Command::Vote { .. } => "vote",
            Command::SendMessage { .. } => "sendMessage",
            Command::Start { .. } => "start",
            Command::SubscriptionFailed { .. } => "subscriptionFailed",
            Command::ModifyDescription { .. } => "modifyDescription",
            Command::ChangeSettings { .. } => "changeSettings",
            Command::RoomInfo { .. } => "roomInfo",
            Command::ParticipantCounts { .. } => "participantCounts",
            Command::RoomHome { .. } => "roomHome",
            Command::ListRooms(_) => "listRooms",
            Command::PreviousMessages { .. } => "previousMessages",
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
