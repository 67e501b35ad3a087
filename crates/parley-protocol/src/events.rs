//! Outbound payloads published to topics.
//!
//! A [`Broadcast`] is what subscribers of a [`Topic`](crate::Topic) receive.
//! Which variant goes where:
//!
//! ```text
//! chat.<channel>            Notice, Chat
//! <room>.participants.list  Roster
//! progress.<room>           Progress, Result, Interruption
//! error                     Error
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, MessageId, ParticipantStatus, Role};

/// One row of a room roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub nickname: String,
    pub role: Role,
    pub status: ParticipantStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoticeKind {
    Enter,
    Leave,
    Event,
}

/// A stored chat message as handed back to the sender and broadcast to
/// the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    #[serde(rename = "type")]
    pub kind: String,
    pub sender: String,
    pub message: String,
    pub reply_to: Option<MessageId>,
    pub created_at: DateTime<Utc>,
}

/// Final outcome of a debate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteResult {
    pub support: u32,
    pub opposite: u32,
    /// `None` when nobody was nominated.
    pub mvp: Option<String>,
}

/// A payload published to a topic.
///
/// Internally tagged by `event` so clients can switch on one field
/// regardless of the topic they listened on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Broadcast {
    /// Enter, leave and system notices on a chat channel.
    Notice { kind: NoticeKind, message: String },

    /// The full participant list of a room.
    Roster { participants: Vec<RosterEntry> },

    /// One countdown tick of a debate phase.
    Progress {
        phase: String,
        remaining_time: String,
        message: String,
    },

    /// The tally published once voting closes.
    Result {
        phase: String,
        remaining_time: String,
        message: String,
        result: VoteResult,
    },

    /// The room is no longer viable and will be removed shortly.
    Interruption { message: String },

    /// A rejected request, published so asynchronous senders see it.
    Error { title: String, message: String },

    /// A chat message.
    Chat(ChatMessage),
}

impl Broadcast {
    pub fn notice(kind: NoticeKind, message: impl Into<String>) -> Self {
        Broadcast::Notice {
            kind,
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Broadcast::Error {
            title: title.into(),
            message: message.into(),
        }
    }
}
