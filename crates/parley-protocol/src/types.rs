//! Identifiers, topics and the small enums every layer of Parley shares.
//!
//! These are the values that show up both on the wire and inside the
//! persisted Room aggregate, so their serde shapes are fixed:
//! identifiers are bare strings, statuses are SCREAMING_CASE and roles are
//! lowercase.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Declares a string-backed identifier newtype.
///
/// Every id in Parley is an opaque token minted from a v4 UUID. Wrapping
/// each one in its own type means a `ChannelId` can never be passed where
/// a `RoomId` is expected, even though both are strings underneath.
macro_rules! token_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Mints a fresh, globally unique identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }
    };
}

token_id!(
    /// Internal key of a room. Also used in the roster and progress topics.
    RoomId
);

token_id!(
    /// A chat topic token: either a room's main channel or one of its
    /// per-role sub-channels.
    ChannelId
);

token_id!(
    /// Identity of a member inside a room. The owner's id is minted when
    /// the room is created; everyone else gets one on join.
    MemberId
);

token_id!(
    /// Identifier of a stored chat message.
    MessageId
);

/// Identifier of one live client connection.
///
/// Unlike the token ids this never leaves the process, so a counter is
/// enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Topic: where broadcasts go
// ---------------------------------------------------------------------------

/// A named pub/sub destination.
///
/// | Variant | Wire form |
/// |---|---|
/// | `Chat(ch)` | `chat.<ch>` |
/// | `Roster(room)` | `<room>.participants.list` |
/// | `Progress(room)` | `progress.<room>` |
/// | `Error` | `error` |
///
/// Topics serialize as their wire string. Parsing also accepts a leading
/// `/topic/` prefix, which some STOMP-style clients send.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Topic {
    Chat(ChannelId),
    Roster(RoomId),
    Progress(RoomId),
    Error,
}

const ROSTER_SUFFIX: &str = ".participants.list";

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Chat(channel) => write!(f, "chat.{channel}"),
            Topic::Roster(room) => write!(f, "{room}{ROSTER_SUFFIX}"),
            Topic::Progress(room) => write!(f, "progress.{room}"),
            Topic::Error => f.write_str("error"),
        }
    }
}

impl FromStr for Topic {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix("/topic/").unwrap_or(s);
        let invalid = || ProtocolError::InvalidTopic(s.to_owned());

        if raw == "error" {
            return Ok(Topic::Error);
        }
        if let Some(channel) = raw.strip_prefix("chat.") {
            return non_empty(channel)
                .map(|c| Topic::Chat(ChannelId::from(c)))
                .ok_or_else(invalid);
        }
        if let Some(room) = raw.strip_prefix("progress.") {
            return non_empty(room)
                .map(|r| Topic::Progress(RoomId::from(r)))
                .ok_or_else(invalid);
        }
        if let Some(room) = raw.strip_suffix(ROSTER_SUFFIX) {
            return non_empty(room)
                .map(|r| Topic::Roster(RoomId::from(r)))
                .ok_or_else(invalid);
        }
        Err(invalid())
    }
}

fn non_empty(s: &str) -> Option<&str> {
    (!s.is_empty()).then_some(s)
}

impl From<Topic> for String {
    fn from(topic: Topic) -> Self {
        topic.to_string()
    }
}

impl TryFrom<String> for Topic {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, ProtocolError> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Room-level enums
// ---------------------------------------------------------------------------

/// How a room is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatMode {
    /// Two sides plus spectators, driven through timed phases.
    Debate,
    /// Free-form roles, a plain duration, no phase timer.
    Free,
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatMode::Debate => f.write_str("DEBATE"),
            ChatMode::Free => f.write_str("FREE"),
        }
    }
}

/// Lifecycle of a room.
///
/// Transitions only go forward, one step at a time:
///
/// ```text
/// CREATED ──► STARTED ──► ENDED
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    #[default]
    Created,
    Started,
    Ended,
}

impl RoomStatus {
    /// The single state this one may move to, if any.
    pub fn next(self) -> Option<RoomStatus> {
        match self {
            RoomStatus::Created => Some(RoomStatus::Started),
            RoomStatus::Started => Some(RoomStatus::Ended),
            RoomStatus::Ended => None,
        }
    }

    pub fn can_transition_to(self, target: RoomStatus) -> bool {
        self.next() == Some(target)
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoomStatus::Created => "CREATED",
            RoomStatus::Started => "STARTED",
            RoomStatus::Ended => "ENDED",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Participant-level enums
// ---------------------------------------------------------------------------

/// The role a participant holds, which also selects its sub-channel.
///
/// Debate rooms use the three fixed roles. Free rooms accept any string,
/// carried in `Custom`. On the wire a role is always a lowercase string
/// for the fixed roles and the raw string otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
    Support,
    Opposite,
    Spectator,
    Custom(String),
}

impl Role {
    pub fn as_str(&self) -> &str {
        match self {
            Role::Support => "support",
            Role::Opposite => "opposite",
            Role::Spectator => "spectator",
            Role::Custom(s) => s,
        }
    }

    /// `true` for the two roles bound by the per-side capacity.
    pub fn is_side(&self) -> bool {
        matches!(self, Role::Support | Role::Opposite)
    }
}

impl From<String> for Role {
    fn from(value: String) -> Self {
        match value.as_str() {
            "support" => Role::Support,
            "opposite" => Role::Opposite,
            "spectator" => Role::Spectator,
            _ => Role::Custom(value),
        }
    }
}

impl From<&str> for Role {
    fn from(value: &str) -> Self {
        Role::from(value.to_owned())
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        match role {
            Role::Custom(s) => s,
            fixed => fixed.as_str().to_owned(),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant's standing in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantStatus {
    Owner,
    Pending,
    Ready,
    Disconnected,
}

impl fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParticipantStatus::Owner => "OWNER",
            ParticipantStatus::Pending => "PENDING",
            ParticipantStatus::Ready => "READY",
            ParticipantStatus::Disconnected => "DISCONNECTED",
        };
        f.write_str(s)
    }
}

/// The side a vote is cast for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Team {
    Support,
    Opposite,
}

impl FromStr for Team {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUPPORT" => Ok(Team::Support),
            "OPPOSITE" => Ok(Team::Opposite),
            other => Err(ProtocolError::InvalidValue(format!(
                "team must be SUPPORT or OPPOSITE, got {other:?}"
            ))),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
