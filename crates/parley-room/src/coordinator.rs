//! The room coordinator: every request that changes or reads a room.
//!
//! # Locking
//!
//! Each mutating operation takes the room's lock from [`RoomLocks`], loads
//! the room fresh, validates, mutates, saves, and only then publishes. A
//! request that fails validation leaves the stored room untouched.
//!
//! # Error topic
//!
//! `ready`, `vote` and `send_message` usually arrive over a live channel
//! rather than as a request with a reply, so their failures are also
//! published to [`Topic::Error`].

use std::sync::Arc;

use chrono::Utc;
use parley_protocol::{
    Broadcast, ChangeSettingsRequest, ChannelId, ChatMessage, ChatMode,
    CreateRoomRequest, CreateRoomResponse, JoinRequest, JoinResponse, MemberId,
    MessageId, ModifyDescriptionRequest, NoticeKind, ParticipantCounts,
    ParticipantStatus, ReadyRequest, Role, RoomFilter, RoomHome, RoomId,
    RoomStatus, RoomSummary, RosterEntry, SendMessageRequest, SessionId,
    SortKey, SortOrder, StartRequest, SubscriptionFailure, Team,
    TeamChangeRequest, TeamChangeResponse, Topic, VoteRequest,
};
use parley_session::SessionRegistry;
use tracing::{info, warn};

use crate::{
    Compensation, CoordinatorConfig, DebatePhase, Member, Participant,
    PhaseScheduler, PresenceMonitor, Publisher, Room, RoomError, RoomLocks,
    RoomStore, generate_nickname,
};

const TITLE_CHARS: std::ops::RangeInclusive<usize> = 3..=50;

/// Coordinates rooms on top of a [`RoomStore`].
///
/// Owns the [`PresenceMonitor`] and [`PhaseScheduler`], which share its
/// store, publisher and lock table. Cloning is cheap and every clone
/// drives the same rooms.
#[derive(Clone)]
pub struct RoomCoordinator {
    pub(crate) store: Arc<dyn RoomStore>,
    pub(crate) publisher: Arc<dyn Publisher>,
    pub(crate) registry: Arc<SessionRegistry>,
    pub(crate) locks: RoomLocks,
    pub(crate) config: CoordinatorConfig,
    pub(crate) presence: PresenceMonitor,
    pub(crate) phases: PhaseScheduler,
}

impl RoomCoordinator {
    pub fn new(
        store: Arc<dyn RoomStore>,
        publisher: Arc<dyn Publisher>,
        registry: Arc<SessionRegistry>,
        config: CoordinatorConfig,
    ) -> Self {
        let locks = RoomLocks::new();
        let phases = PhaseScheduler::new(
            Arc::clone(&store),
            Arc::clone(&publisher),
            locks.clone(),
            config,
        );
        let presence = PresenceMonitor::new(
            Arc::clone(&store),
            Arc::clone(&publisher),
            locks.clone(),
            config,
            phases.clone(),
        );
        Self {
            store,
            publisher,
            registry,
            locks,
            config,
            presence,
            phases,
        }
    }

    pub fn presence(&self) -> &PresenceMonitor {
        &self.presence
    }

    pub fn phases(&self) -> &PhaseScheduler {
        &self.phases
    }

    /// The per-room lock table shared with the background tasks.
    pub fn locks(&self) -> &RoomLocks {
        &self.locks
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Creation and owner edits
    // -----------------------------------------------------------------------

    /// Creates a room in `CREATED` with no participants.
    ///
    /// The owner id returned here is what the owner later presents to
    /// join as owner and to call owner-only operations.
    pub async fn create_room(&self, req: CreateRoomRequest) -> Result<CreateRoomResponse, RoomError> {
        let title = req.title.trim();
        if !TITLE_CHARS.contains(&title.chars().count()) {
            return Err(RoomError::InvalidRequest(format!(
                "title must be {} to {} characters",
                TITLE_CHARS.start(),
                TITLE_CHARS.end()
            )));
        }

        let (duration, settings) = match req.mode {
            ChatMode::Debate => {
                check_debate_capacity(req.max_participants)?;
                let settings = req.debate_settings.ok_or_else(|| {
                    RoomError::InvalidSettings("a debate needs debate settings".into())
                })?;
                (settings.total_minutes(), Some(settings))
            }
            ChatMode::Free => (check_free_duration(req.duration)?, None),
        };

        let owner_id = MemberId::generate();
        let room = Room::new(
            title.to_owned(),
            req.description,
            req.mode,
            req.max_participants,
            duration,
            settings,
            owner_id.clone(),
        );

        self.store.save_member(&Member {
            member_id: owner_id.clone(),
            nickname: None,
        })?;
        self.store.save(&room)?;

        info!(room_id = %room.id, mode = %room.mode, max = room.max_participants, "room created");
        Ok(CreateRoomResponse {
            room_id: room.id,
            owner_id,
        })
    }

    pub async fn modify_description(
        &self,
        room_id: &RoomId,
        req: ModifyDescriptionRequest,
    ) -> Result<(), RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let mut room = self.load(room_id)?;
        if req.owner_id != room.owner_id {
            return Err(RoomError::NotOwner);
        }

        room.description = req.description;
        room.touch();
        self.store.save(&room)?;
        info!(%room_id, "description changed");
        Ok(())
    }

    /// Changes capacity and timing before the room starts.
    pub async fn change_settings(
        &self,
        room_id: &RoomId,
        req: ChangeSettingsRequest,
    ) -> Result<(), RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let mut room = self.load(room_id)?;
        ensure_not_started(&room)?;
        if req.owner_id != room.owner_id {
            return Err(RoomError::NotOwner);
        }

        match room.mode {
            ChatMode::Debate => {
                check_debate_capacity(req.max_participants)?;
                let settings = req.debate_settings.ok_or_else(|| {
                    RoomError::InvalidSettings("a debate needs debate settings".into())
                })?;
                room.duration = settings.total_minutes();
                room.debate_settings = Some(settings);
            }
            ChatMode::Free => room.duration = check_free_duration(req.duration)?,
        }

        let counts = room.role_counts();
        let side_cap = req.max_participants / 2;
        if counts.support > side_cap || counts.opposite > side_cap {
            return Err(RoomError::InvalidSettings(format!(
                "{} participants cannot hold the current teams",
                req.max_participants
            )));
        }

        room.max_participants = req.max_participants;
        room.touch();
        self.store.save(&room)?;
        info!(%room_id, max = room.max_participants, duration = room.duration, "settings changed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------------

    /// Adds a participant.
    ///
    /// Presenting the room's `owner_id` joins as the owner; otherwise a
    /// fresh member id is issued. Without a nickname one is generated.
    pub async fn join(&self, room_id: &RoomId, req: JoinRequest) -> Result<JoinResponse, RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let mut room = self.load(room_id)?;
        if room.status == RoomStatus::Ended {
            return Err(RoomError::AlreadyEnded(room_id.clone()));
        }
        check_role_allowed(&room, &req.role)?;
        self.check_capacity(&room, &req.role)?;

        let member_id = match req.owner_id {
            Some(id) if id == room.owner_id => id,
            Some(_) => return Err(RoomError::InvalidOwner),
            None => MemberId::generate(),
        };
        if room.participant(&member_id).is_some() {
            return Err(RoomError::AlreadyJoined(member_id));
        }

        let nickname = match req.nickname.map(|n| n.trim().to_owned()) {
            Some(nick) if !nick.is_empty() => {
                if room.participant_by_nickname(&nick).is_some() {
                    return Err(RoomError::DuplicateNickname(nick));
                }
                nick
            }
            _ => generate_nickname(|candidate| room.participant_by_nickname(candidate).is_some()),
        };

        let status = if member_id == room.owner_id {
            ParticipantStatus::Owner
        } else {
            ParticipantStatus::Pending
        };
        let sub_channel_id = room.insert_participant(Participant::new(
            member_id.clone(),
            req.role.clone(),
            status,
            nickname.clone(),
        ));

        self.store.save_member(&Member {
            member_id: member_id.clone(),
            nickname: Some(nickname.clone()),
        })?;
        self.store.save(&room)?;

        let enter = Broadcast::notice(NoticeKind::Enter, format!("{nickname} has joined."));
        self.publisher
            .publish(&Topic::Chat(room.channel_id.clone()), enter.clone());
        self.publisher
            .publish(&Topic::Chat(sub_channel_id.clone()), enter);
        self.publish_roster(&room);

        info!(%room_id, %member_id, role = %req.role, %status, "member joined");
        Ok(JoinResponse {
            room_id: room.id,
            member_id,
            channel_id: room.channel_id,
            sub_channel_id,
            nickname,
        })
    }

    /// Moves a member to another role before the room starts.
    pub async fn change_team(
        &self,
        room_id: &RoomId,
        member_id: &MemberId,
        req: TeamChangeRequest,
    ) -> Result<TeamChangeResponse, RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let mut room = self.load(room_id)?;
        ensure_not_started(&room)?;

        let current = room
            .participant(member_id)
            .map(|p| p.role.clone())
            .ok_or_else(|| RoomError::MemberNotFound(member_id.clone()))?;
        if current == req.role {
            return Err(RoomError::SameRole(req.role));
        }
        check_role_allowed(&room, &req.role)?;
        self.check_role_cap(&room, &req.role)?;

        let declared_origin = room
            .sub_room_for(&current)
            .is_some_and(|sub| sub.sub_channel_id == req.sub_channel_id);
        if !declared_origin {
            return Err(RoomError::InconsistentRequest(format!(
                "sub-channel {} is not the member's current channel",
                req.sub_channel_id
            )));
        }

        let (origin, target) = room
            .change_role(member_id, req.role.clone())
            .ok_or_else(|| RoomError::MemberNotFound(member_id.clone()))?;
        self.store.save(&room)?;
        self.publish_roster(&room);

        info!(%room_id, %member_id, from = %current, to = %req.role, "team changed");
        Ok(TeamChangeResponse {
            room_id: room.id,
            channel_id: room.channel_id,
            new_sub_channel_id: target,
            origin_sub_channel_id: origin,
        })
    }

    /// Undoes a join or team change whose channel subscription failed.
    ///
    /// The undo is computed on a copy and saved in one write. If anything
    /// inside the undo fails the stored room is unchanged and the error
    /// comes back wrapped in [`RoomError::RollbackFailed`].
    pub async fn subscription_failed(
        &self,
        room_id: &RoomId,
        failure: SubscriptionFailure,
    ) -> Result<(), RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let room = self.load(room_id)?;
        let Some(current) = room.participant(&failure.member_id).map(|p| p.role.clone()) else {
            return Err(RoomError::MemberNotFound(failure.member_id));
        };

        let compensation = Compensation::from_failure(failure)?;
        // While the member sits in `to`, `from` is counted without it and
        // someone may have taken the freed slot.
        if let Compensation::UndoTeamChange { from, to, .. } = &compensation {
            if from != to && &current == to {
                self.check_role_cap(&room, from).map_err(RoomError::rollback)?;
            }
        }
        let mut draft = room.clone();
        compensation.apply(&mut draft).map_err(RoomError::rollback)?;
        self.commit(&compensation, &room, &draft)
            .map_err(RoomError::rollback)?;
        self.publish_roster(&draft);

        warn!(%room_id, member_id = %compensation.member_id(), ?compensation, "optimistic change rolled back");
        Ok(())
    }

    fn commit(&self, compensation: &Compensation, before: &Room, after: &Room) -> Result<(), RoomError> {
        self.store.save(after)?;
        if let Compensation::UndoJoin { member_id, .. } = compensation {
            if let Err(err) = self.store.delete_member(member_id) {
                self.store.save(before)?;
                return Err(err.into());
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Live-channel operations
    // -----------------------------------------------------------------------

    /// Sets a non-owner's `READY`/`PENDING` status and returns the roster.
    pub async fn ready(&self, room_id: &RoomId, req: ReadyRequest) -> Result<Vec<RosterEntry>, RoomError> {
        let result = self.ready_inner(room_id, req).await;
        self.report("Ready failed", result)
    }

    async fn ready_inner(&self, room_id: &RoomId, req: ReadyRequest) -> Result<Vec<RosterEntry>, RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let mut room = self.load(room_id)?;
        if req.mode != room.mode || req.mode != ChatMode::Debate {
            return Err(RoomError::ModeMismatch);
        }
        if req.member_id == room.owner_id {
            return Err(RoomError::OwnerCannotReady);
        }
        ensure_not_started(&room)?;
        if !matches!(req.status, ParticipantStatus::Ready | ParticipantStatus::Pending) {
            return Err(RoomError::InvalidStatus(req.status));
        }

        room.set_status(&req.member_id, req.status, Utc::now())
            .ok_or_else(|| RoomError::MemberNotFound(req.member_id.clone()))?;
        self.store.save(&room)?;
        self.publish_roster(&room);

        info!(%room_id, member_id = %req.member_id, status = %req.status, "ready status changed");
        Ok(room.roster())
    }

    /// Stores a chat message and publishes it to its channel.
    ///
    /// `channel` is the room's main channel, or a sub-channel whose role
    /// matches the message type.
    pub async fn send_message(
        &self,
        channel: &ChannelId,
        req: SendMessageRequest,
    ) -> Result<ChatMessage, RoomError> {
        let result = self.send_message_inner(channel, req);
        self.report("Message not sent", result)
    }

    fn send_message_inner(&self, channel: &ChannelId, req: SendMessageRequest) -> Result<ChatMessage, RoomError> {
        let room = self.load(&req.id)?;
        if &room.channel_id != channel {
            let matches = room
                .sub_room_by_channel(channel)
                .is_some_and(|sub| sub.role.as_str() == req.kind);
            if !matches {
                return Err(RoomError::InvalidChannel(channel.clone()));
            }
        }
        if room.participants().is_empty() {
            return Err(RoomError::NoParticipants(room.id));
        }
        if room.participant_by_nickname(&req.sender).is_none() {
            return Err(RoomError::UnknownParticipant(req.sender));
        }

        let message = ChatMessage {
            id: MessageId::generate(),
            channel_id: channel.clone(),
            kind: req.kind,
            sender: req.sender,
            message: req.message,
            reply_to: req.reply_to,
            created_at: Utc::now(),
        };
        self.store.append_message(&message)?;
        self.publisher
            .publish(&Topic::Chat(channel.clone()), Broadcast::Chat(message.clone()));
        Ok(message)
    }

    /// Starts the room. A debate also starts its phase timer.
    ///
    /// `session` must be subscribed to the room's roster; otherwise the
    /// start is undone and [`RoomError::NotSubscribed`] returned.
    pub async fn start(
        &self,
        room_id: &RoomId,
        session: SessionId,
        req: StartRequest,
    ) -> Result<(), RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let mut room = self.load(room_id)?;
        if req.owner_id != room.owner_id {
            return Err(RoomError::NotOwner);
        }
        ensure_not_started(&room)?;

        let waiting = room
            .participants()
            .iter()
            .any(|p| p.member_id != room.owner_id && p.status == ParticipantStatus::Pending);
        if waiting {
            return Err(RoomError::ParticipantsNotReady);
        }
        if room.mode == ChatMode::Debate {
            let counts = room.role_counts();
            if counts.support == 0 || counts.opposite == 0 {
                return Err(RoomError::InsufficientParticipants);
            }
        }

        room.status = RoomStatus::Started;
        room.touch();
        self.store.save(&room)?;

        let roster = Topic::Roster(room_id.clone());
        if !self.registry.is_bound(session, &roster) {
            room.status = RoomStatus::Created;
            room.touch();
            self.store.save(&room)?;
            return Err(RoomError::NotSubscribed(roster));
        }

        if room.mode == ChatMode::Debate {
            self.phases.start(room_id, room.mode, room.debate_settings)?;
        }
        info!(%room_id, mode = %room.mode, participants = room.participants().len(), "room started");
        Ok(())
    }

    /// Records one vote while the debate is in its voting phase.
    pub async fn vote(&self, room_id: &RoomId, req: VoteRequest) -> Result<(), RoomError> {
        let result = self.vote_inner(room_id, req).await;
        self.report("Vote rejected", result)
    }

    async fn vote_inner(&self, room_id: &RoomId, req: VoteRequest) -> Result<(), RoomError> {
        if req.kind != "VOTE" {
            return Err(RoomError::InvalidRequest(format!(
                "vote type must be VOTE, got {:?}",
                req.kind
            )));
        }
        let _guard = self.locks.lock(room_id).await;
        let mut room = self.load(room_id)?;
        if room.mode != ChatMode::Debate {
            return Err(RoomError::ModeMismatch);
        }
        if room.status != RoomStatus::Started
            || self.phases.current_phase(room_id) != Some(DebatePhase::VotingTime)
        {
            return Err(RoomError::VotingClosed(room_id.clone()));
        }

        let team: Team = req
            .team
            .parse()
            .map_err(|_| RoomError::InvalidTeam(req.team.clone()))?;
        if room.participant_by_nickname(&req.mvp).is_none() {
            return Err(RoomError::UnknownParticipant(req.mvp));
        }

        room.vote.record(team, req.mvp);
        room.touch();
        self.store.save(&room)?;
        info!(%room_id, ?team, "vote recorded");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// A full snapshot of the room.
    pub fn room_info(&self, room_id: &RoomId) -> Result<Room, RoomError> {
        let mut room = self.load(room_id)?;
        if room.mode == ChatMode::Free {
            room.debate_settings = None;
        }
        Ok(room)
    }

    pub fn participant_counts(&self, room_id: &RoomId) -> Result<ParticipantCounts, RoomError> {
        let room = self.load(room_id)?;
        let counts = room.role_counts();
        Ok(ParticipantCounts {
            current_participants: counts.support + counts.opposite,
            max_participants: room.max_participants,
            support: counts.support,
            opposite: counts.opposite,
            spectator: counts.spectator,
        })
    }

    pub fn room_home(&self, room_id: &RoomId) -> Result<RoomHome, RoomError> {
        let room = self.load(room_id)?;
        Ok(RoomHome {
            title: room.title,
            description: room.description,
            mode: room.mode,
            duration: room.duration,
            max_participants: room.max_participants,
        })
    }

    /// One page of rooms matching `filter`.
    pub fn list_rooms(&self, filter: &RoomFilter) -> Result<Vec<RoomSummary>, RoomError> {
        let mut summaries: Vec<RoomSummary> = self
            .store
            .rooms()?
            .into_iter()
            .filter(|r| filter.mode.is_none_or(|m| r.mode == m))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .map(summarize)
            .collect();

        summaries.sort_by(|a, b| {
            let ord = match filter.sort {
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
                SortKey::Participants => a.current_participants.cmp(&b.current_participants),
            };
            let ord = match filter.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            };
            ord.then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });

        Ok(summaries
            .into_iter()
            .skip(filter.page.saturating_mul(filter.size))
            .take(filter.size)
            .collect())
    }

    /// Messages stored for `channel` before now, oldest first.
    pub fn previous_messages(&self, channel: &ChannelId) -> Result<Vec<ChatMessage>, RoomError> {
        let now = Utc::now();
        Ok(self
            .store
            .messages(channel)?
            .into_iter()
            .filter(|m| m.created_at <= now)
            .collect())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Loads a room. A miss also drops the lock entry the caller may have
    /// just created for the unknown id.
    pub(crate) fn load(&self, room_id: &RoomId) -> Result<Room, RoomError> {
        self.store.load(room_id)?.ok_or_else(|| {
            self.locks.forget(room_id);
            RoomError::NotFound(room_id.clone())
        })
    }

    pub(crate) fn publish_roster(&self, room: &Room) {
        self.publisher.publish(
            &Topic::Roster(room.id.clone()),
            Broadcast::Roster {
                participants: room.roster(),
            },
        );
    }

    /// Publishes a failure to the error topic before handing it back.
    pub(crate) fn report<T>(&self, title: &str, result: Result<T, RoomError>) -> Result<T, RoomError> {
        if let Err(err) = &result {
            warn!(kind = err.kind(), %err, "{title}");
            self.publisher
                .publish(&Topic::Error, Broadcast::error(title, err.to_string()));
        }
        result
    }

    fn check_capacity(&self, room: &Room, role: &Role) -> Result<(), RoomError> {
        let total = room.participants().len() as u32;
        if total >= room.max_participants.saturating_add(self.config.max_spectators) {
            return Err(RoomError::CapacityExceeded(room.id.clone()));
        }
        if room.status == RoomStatus::Started && role.is_side() {
            return Err(RoomError::AlreadyStarted(room.id.clone()));
        }
        self.check_role_cap(room, role)
    }

    fn check_role_cap(&self, room: &Room, role: &Role) -> Result<(), RoomError> {
        let full = match role {
            Role::Support | Role::Opposite => room.count_role(role) >= room.max_participants / 2,
            Role::Spectator => room.count_role(role) >= self.config.max_spectators,
            Role::Custom(_) => false,
        };
        if full {
            return Err(RoomError::RoleUnavailable(role.clone()));
        }
        Ok(())
    }
}

fn summarize(room: Room) -> RoomSummary {
    let counts = room.role_counts();
    let owner_nickname = room
        .participants()
        .iter()
        .find(|p| p.status == ParticipantStatus::Owner)
        .map(|p| p.nickname.clone())
        .unwrap_or_else(|| "Unknown".to_owned());
    RoomSummary {
        id: room.id,
        mode: room.mode,
        title: room.title,
        description: room.description,
        duration: room.duration,
        owner_nickname,
        max_participants: room.max_participants,
        current_participants: counts.support + counts.opposite,
        created_at: room.created_at,
        updated_at: room.updated_at,
    }
}

/// Debates take custom roles nowhere, and no mode takes an empty one.
fn check_role_allowed(room: &Room, role: &Role) -> Result<(), RoomError> {
    match role {
        Role::Custom(name) if name.trim().is_empty() => {
            Err(RoomError::InvalidRequest("role must not be empty".into()))
        }
        Role::Custom(_) if room.mode == ChatMode::Debate => {
            Err(RoomError::RoleUnavailable(role.clone()))
        }
        _ => Ok(()),
    }
}

fn ensure_not_started(room: &Room) -> Result<(), RoomError> {
    match room.status {
        RoomStatus::Created => Ok(()),
        RoomStatus::Started => Err(RoomError::AlreadyStarted(room.id.clone())),
        RoomStatus::Ended => Err(RoomError::AlreadyEnded(room.id.clone())),
    }
}

/// Debate capacity is split evenly between two sides of at least three.
fn check_debate_capacity(max: u32) -> Result<(), RoomError> {
    if max % 2 != 0 || (1..6).contains(&max) {
        return Err(RoomError::InvalidSettings(format!(
            "a debate needs an even participant cap of 0 or at least 6, got {max}"
        )));
    }
    Ok(())
}

fn check_free_duration(duration: Option<f64>) -> Result<f64, RoomError> {
    match duration {
        Some(minutes) if minutes.is_finite() && minutes >= 0.0 => Ok(minutes),
        Some(minutes) => Err(RoomError::InvalidSettings(format!("invalid duration {minutes}"))),
        None => Err(RoomError::InvalidSettings("a free room needs a duration".into())),
    }
}
