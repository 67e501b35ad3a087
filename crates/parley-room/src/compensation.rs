//! Undo actions for optimistic joins and team changes.
//!
//! A join or team change is applied before the client has finished
//! subscribing to its new channels. If that subscription fails, the client
//! reports it and the matching [`Compensation`] puts the room back.

use parley_protocol::{FailureKind, MemberId, Role, SubscriptionFailure};

use crate::{Room, RoomError};

/// The undo of one specific mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Compensation {
    /// Remove a member that joined as `role`.
    UndoJoin { member_id: MemberId, role: Role },

    /// Move a member from `to` back to `from`.
    UndoTeamChange {
        member_id: MemberId,
        from: Role,
        to: Role,
    },
}

impl Compensation {
    /// # Errors
    /// [`RoomError::InvalidRequest`] if a team-change failure does not name
    /// the role the member moved to.
    pub fn from_failure(failure: SubscriptionFailure) -> Result<Self, RoomError> {
        match failure.kind {
            FailureKind::EnterFailed => Ok(Compensation::UndoJoin {
                member_id: failure.member_id,
                role: failure.origin_role,
            }),
            FailureKind::TeamChangeFailed => {
                let to = failure.new_role.ok_or_else(|| {
                    RoomError::InvalidRequest("team change failure needs newRole".into())
                })?;
                Ok(Compensation::UndoTeamChange {
                    member_id: failure.member_id,
                    from: failure.origin_role,
                    to,
                })
            }
        }
    }

    pub fn member_id(&self) -> &MemberId {
        match self {
            Compensation::UndoJoin { member_id, .. }
            | Compensation::UndoTeamChange { member_id, .. } => member_id,
        }
    }

    /// Applies the undo to `room`. The member must still hold the role the
    /// mutation gave it.
    pub fn apply(&self, room: &mut Room) -> Result<(), RoomError> {
        let member_id = self.member_id();
        let current = room
            .participant(member_id)
            .map(|p| p.role.clone())
            .ok_or_else(|| RoomError::MemberNotFound(member_id.clone()))?;

        let expected = match self {
            Compensation::UndoJoin { role, .. } => role,
            Compensation::UndoTeamChange { to, .. } => to,
        };
        if &current != expected {
            return Err(RoomError::RoleMismatch {
                expected: expected.clone(),
                actual: current,
            });
        }

        match self {
            Compensation::UndoJoin { .. } => {
                room.remove_participant(member_id);
            }
            Compensation::UndoTeamChange { from, .. } => {
                room.change_role(member_id, from.clone())
                    .ok_or_else(|| RoomError::MemberNotFound(member_id.clone()))?;
            }
        }
        Ok(())
    }
}
