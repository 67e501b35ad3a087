//! Error types for the room layer.

use parley_protocol::{ChannelId, MemberId, ParticipantStatus, Role, RoomId, Topic};

/// Errors raised by a [`RoomStore`](crate::RoomStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached or refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored document could not be read back.
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// Errors that can occur during room operations.
///
/// Every variant maps to a stable [`kind`](Self::kind) string, which is
/// what clients see in error replies.
#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {0} not found")]
    NotFound(RoomId),

    /// The room has no free slot left, spectators included.
    #[error("room {0} is full")]
    CapacityExceeded(RoomId),

    /// The requested role is full, closed after start, or not offered in
    /// this mode.
    #[error("role {0} is not available")]
    RoleUnavailable(Role),

    #[error("room {0} has already started")]
    AlreadyStarted(RoomId),

    #[error("room {0} has already ended")]
    AlreadyEnded(RoomId),

    /// A join claimed to be the owner with an id that is not the owner's.
    #[error("invalid owner id")]
    InvalidOwner,

    /// An owner-only operation was attempted by someone else.
    #[error("only the room owner may do this")]
    NotOwner,

    #[error("nickname {0:?} is already taken in this room")]
    DuplicateNickname(String),

    #[error("member {0} has already joined this room")]
    AlreadyJoined(MemberId),

    #[error("member {0} is not in this room")]
    MemberNotFound(MemberId),

    #[error("member already holds role {0}")]
    SameRole(Role),

    /// The request contradicts the room's current state, e.g. a team
    /// change that names the wrong origin sub-channel.
    #[error("inconsistent request: {0}")]
    InconsistentRequest(String),

    #[error("expected role {expected}, member holds {actual}")]
    RoleMismatch { expected: Role, actual: Role },

    #[error("every participant must be ready before starting")]
    ParticipantsNotReady,

    #[error("a debate needs at least one supporter and one opponent")]
    InsufficientParticipants,

    #[error("not subscribed to {0}")]
    NotSubscribed(Topic),

    #[error("request type does not match the room's mode")]
    ModeMismatch,

    #[error("team must be SUPPORT or OPPOSITE, got {0:?}")]
    InvalidTeam(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no participant named {0:?}")]
    UnknownParticipant(String),

    #[error("room {0} is not in its voting phase")]
    VotingClosed(RoomId),

    #[error("channel {0} does not belong to this room")]
    InvalidChannel(ChannelId),

    #[error("status {0} cannot be set by request")]
    InvalidStatus(ParticipantStatus),

    #[error("the owner cannot change ready status")]
    OwnerCannotReady,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("room {0} has no participants")]
    NoParticipants(RoomId),

    /// Undoing an optimistic join or team change failed. The room was
    /// left as it was before the undo was attempted.
    #[error("rollback failed: {source}")]
    RollbackFailed {
        #[source]
        source: Box<RoomError>,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RoomError {
    /// Stable machine-readable name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            RoomError::NotFound(_) => "NotFound",
            RoomError::CapacityExceeded(_) => "CapacityExceeded",
            RoomError::RoleUnavailable(_) => "RoleUnavailable",
            RoomError::AlreadyStarted(_) => "AlreadyStarted",
            RoomError::AlreadyEnded(_) => "AlreadyEnded",
            RoomError::InvalidOwner => "InvalidOwner",
            RoomError::NotOwner => "NotOwner",
            RoomError::DuplicateNickname(_) => "DuplicateNickname",
            RoomError::AlreadyJoined(_) => "AlreadyJoined",
            RoomError::MemberNotFound(_) => "MemberNotFound",
            RoomError::SameRole(_) => "SameRole",
            RoomError::InconsistentRequest(_) => "InconsistentRequest",
            RoomError::RoleMismatch { .. } => "RoleMismatch",
            RoomError::ParticipantsNotReady => "ParticipantsNotReady",
            RoomError::InsufficientParticipants => "InsufficientParticipants",
            RoomError::NotSubscribed(_) => "NotSubscribed",
            RoomError::ModeMismatch => "ModeMismatch",
            RoomError::InvalidTeam(_) => "InvalidTeam",
            RoomError::InvalidRequest(_) => "InvalidRequest",
            RoomError::UnknownParticipant(_) => "UnknownParticipant",
            RoomError::VotingClosed(_) => "VotingClosed",
            RoomError::InvalidChannel(_) => "InvalidChannel",
            RoomError::InvalidStatus(_) => "InvalidStatus",
            RoomError::OwnerCannotReady => "OwnerCannotReady",
            RoomError::InvalidSettings(_) => "InvalidSettings",
            RoomError::NoParticipants(_) => "NoParticipants",
            RoomError::RollbackFailed { .. } => "RollbackFailed",
            RoomError::Store(_) => "Store",
        }
    }

    pub(crate) fn rollback(source: RoomError) -> Self {
        RoomError::RollbackFailed {
            source: Box::new(source),
        }
    }
}
