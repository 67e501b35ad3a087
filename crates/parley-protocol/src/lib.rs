//! Wire vocabulary for Parley.
//!
//! This crate defines the values every other Parley crate agrees on:
//!
//! - **Types** ([`RoomId`], [`Topic`], [`Role`], [`RoomStatus`], …): the
//!   identifiers and enums shared by the wire and the stored Room.
//! - **Commands** ([`Command`] and the request/response structs): what a
//!   client may ask for.
//! - **Events** ([`Broadcast`]): what gets published to a topic.
//! - **Codec** ([`Codec`], [`JsonCodec`]): how frames become bytes.
//!
//! ```text
//! Gateway (bytes) → Protocol (Command / Broadcast) → Room coordination
//! ```
//!
//! It knows nothing about connections or room rules.

mod codec;
mod commands;
mod error;
mod events;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use commands::{
    ChangeSettingsRequest, Command, CreateRoomRequest, CreateRoomResponse,
    DebateSettings, FailureKind, JoinRequest, JoinResponse,
    ModifyDescriptionRequest, ParticipantCounts, ReadyRequest, RoomFilter,
    RoomHome, RoomSummary, SendMessageRequest, SortKey, SortOrder,
    StartRequest, SubscriptionFailure, TeamChangeRequest, TeamChangeResponse,
    VOTING_MINUTES, VoteRequest,
};
pub use error::ProtocolError;
pub use events::{Broadcast, ChatMessage, NoticeKind, RosterEntry, VoteResult};
pub use types::{
    ChannelId, ChatMode, MemberId, MessageId, ParticipantStatus, Role, RoomId,
    RoomStatus, SessionId, Team, Topic,
};
