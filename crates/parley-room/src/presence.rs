//! Presence tracking: disconnects, reconnects, eviction and the viability
//! sweep.
//!
//! ```text
//! CONNECTED ──drop──▶ DISCONNECTED ──resubscribe──▶ restored
//!                          │
//!                     grace expires
//!                          ▼
//!                       evicted ──▶ viability check
//! ```
//!
//! Every check that fires later re-reads the room under its lock. A
//! deferred eviction only proceeds if the participant is still
//! disconnected *from the same drop* it was scheduled for; a reconnect
//! followed by a second drop schedules a fresh check instead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_protocol::{
    Broadcast, ChatMode, MemberId, NoticeKind, ParticipantStatus, Role, RoomId,
    RoomStatus, Topic,
};
use parley_tick::TimerSlots;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{
    CoordinatorConfig, PhaseScheduler, Publisher, Room, RoomError, RoomLocks,
    RoomStore,
};

/// Outcome of one [`PresenceMonitor::sweep`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepReport {
    pub checked: usize,
    /// Rooms newly scheduled for deletion by this pass.
    pub scheduled: usize,
    pub failed: usize,
}

/// Watches participants' connections and removes rooms that can no
/// longer run.
#[derive(Clone)]
pub struct PresenceMonitor {
    store: Arc<dyn RoomStore>,
    publisher: Arc<dyn Publisher>,
    locks: RoomLocks,
    config: CoordinatorConfig,
    phases: PhaseScheduler,
    grace: TimerSlots<(RoomId, MemberId)>,
    deletions: TimerSlots<RoomId>,
}

impl PresenceMonitor {
    pub fn new(
        store: Arc<dyn RoomStore>,
        publisher: Arc<dyn Publisher>,
        locks: RoomLocks,
        config: CoordinatorConfig,
        phases: PhaseScheduler,
    ) -> Self {
        Self {
            store,
            publisher,
            locks,
            config,
            phases,
            grace: TimerSlots::new(),
            deletions: TimerSlots::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Disconnect / reconnect
    // -----------------------------------------------------------------------

    /// Marks `nickname` as disconnected and starts its grace window.
    ///
    /// # Errors
    /// [`RoomError::NotFound`] or [`RoomError::UnknownParticipant`] when
    /// the room or the nickname does not exist.
    pub async fn disconnect(&self, room_id: &RoomId, nickname: &str) -> Result<(), RoomError> {
        let (member_id, at) = {
            let _guard = self.locks.lock(room_id).await;
            let mut room = self.load(room_id)?;
            let member_id = room
                .participant_by_nickname(nickname)
                .map(|p| p.member_id.clone())
                .ok_or_else(|| RoomError::UnknownParticipant(nickname.to_owned()))?;

            let at = Utc::now();
            room.set_status(&member_id, ParticipantStatus::Disconnected, at);
            self.store.save(&room)?;
            self.publish_roster(&room);
            (member_id, at)
        };

        info!(%room_id, %member_id, nickname, "participant disconnected");

        let this = self.clone();
        let key = (room_id.clone(), member_id.clone());
        let (room_id, member_id) = key.clone();
        self.grace.replace(key, async move {
            tokio::time::sleep(this.config.reconnect_grace).await;
            if let Err(err) = this.grace_expired(&room_id, &member_id, at).await {
                error!(%room_id, %member_id, %err, "deferred eviction failed");
            }
        });
        Ok(())
    }

    /// Restores a disconnected participant.
    ///
    /// The owner comes back as `OWNER`; anyone else as `READY` in a started
    /// room and `PENDING` before start. A participant that is not
    /// disconnected is left as it is.
    ///
    /// # Errors
    /// [`RoomError::AlreadyEnded`] once the room has ended.
    pub async fn reconnect(
        &self,
        room_id: &RoomId,
        nickname: &str,
    ) -> Result<ParticipantStatus, RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let mut room = self.load(room_id)?;
        if room.status == RoomStatus::Ended {
            return Err(RoomError::AlreadyEnded(room_id.clone()));
        }

        let participant = room
            .participant_by_nickname(nickname)
            .ok_or_else(|| RoomError::UnknownParticipant(nickname.to_owned()))?;
        if !participant.is_disconnected() {
            return Ok(participant.status);
        }

        let member_id = participant.member_id.clone();
        let status = if member_id == room.owner_id {
            ParticipantStatus::Owner
        } else if room.status == RoomStatus::Started {
            ParticipantStatus::Ready
        } else {
            ParticipantStatus::Pending
        };

        room.set_status(&member_id, status, Utc::now());
        self.store.save(&room)?;
        self.publish_roster(&room);
        self.grace.cancel(&(room_id.clone(), member_id.clone()));

        info!(%room_id, %member_id, %status, "participant reconnected");
        Ok(status)
    }

    /// `true` while an eviction check is pending for the member.
    pub fn grace_pending(&self, room_id: &RoomId, member_id: &MemberId) -> bool {
        self.grace.is_pending(&(room_id.clone(), member_id.clone()))
    }

    async fn grace_expired(
        &self,
        room_id: &RoomId,
        member_id: &MemberId,
        dropped_at: DateTime<Utc>,
    ) -> Result<(), RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let Some(mut room) = self.store.load(room_id)? else {
            self.locks.forget(room_id);
            debug!(%room_id, "room gone before grace expired");
            return Ok(());
        };

        let still_gone = room
            .participant(member_id)
            .is_some_and(|p| p.is_disconnected() && p.disconnected_at == Some(dropped_at));
        if !still_gone {
            debug!(%room_id, %member_id, "participant came back in time");
            return Ok(());
        }

        self.evict(&mut room, member_id)
    }

    // -----------------------------------------------------------------------
    // Eviction
    // -----------------------------------------------------------------------

    /// Removes a participant for good. Caller holds the room lock.
    fn evict(&self, room: &mut Room, member_id: &MemberId) -> Result<(), RoomError> {
        let Some(evictee) = room.participant(member_id).cloned() else {
            return Ok(());
        };

        if evictee.member_id == room.owner_id {
            let successor = room
                .participants()
                .iter()
                .find(|p| {
                    p.member_id != evictee.member_id
                        && !p.is_disconnected()
                        && (room.mode != ChatMode::Debate || p.role != Role::Spectator)
                })
                .cloned();

            let Some(mut successor) = successor else {
                warn!(room_id = %room.id, "no one can take over as owner");
                self.announce_closing(room, "The owner left and no one can take over.");
                return Ok(());
            };

            room.remove_participant(&evictee.member_id);
            room.remove_participant(&successor.member_id);
            successor.status = ParticipantStatus::Owner;
            successor.disconnected_at = None;
            room.owner_id = successor.member_id.clone();
            info!(
                room_id = %room.id,
                from = %evictee.member_id,
                to = %successor.member_id,
                "ownership moved"
            );
            room.insert_participant(successor);
        } else {
            room.remove_participant(&evictee.member_id);
        }

        self.store.delete_member(&evictee.member_id)?;
        self.store.save(room)?;
        info!(room_id = %room.id, member_id = %evictee.member_id, "participant evicted");

        self.publisher.publish(
            &Topic::Chat(room.channel_id.clone()),
            Broadcast::notice(NoticeKind::Leave, format!("{} has left.", evictee.nickname)),
        );
        self.publish_roster(room);
        self.check_viability(room);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Viability
    // -----------------------------------------------------------------------

    /// Checks every started room once. A failing room is logged and
    /// skipped; the pass always covers all rooms.
    pub async fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let rooms = match self.store.rooms_with_status(RoomStatus::Started) {
            Ok(rooms) => rooms,
            Err(err) => {
                error!(%err, "viability sweep could not list rooms");
                report.failed += 1;
                return report;
            }
        };

        for room in rooms {
            report.checked += 1;
            match self.sweep_room(&room.id).await {
                Ok(true) => report.scheduled += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(room_id = %room.id, %err, "viability check failed");
                    report.failed += 1;
                }
            }
        }
        debug!(?report, "viability sweep done");
        report
    }

    async fn sweep_room(&self, room_id: &RoomId) -> Result<bool, RoomError> {
        let _guard = self.locks.lock(room_id).await;
        match self.store.load(room_id)? {
            Some(room) => Ok(self.check_viability(&room)),
            None => {
                self.locks.forget(room_id);
                Ok(false)
            }
        }
    }

    /// Runs [`sweep`](Self::sweep) every `sweep_interval` until the
    /// returned handle is aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(this.config.sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                this.sweep().await;
            }
        })
    }

    /// A started debate needs both sides; a started free room needs
    /// someone connected. Returns `true` if a deletion was newly scheduled.
    fn check_viability(&self, room: &Room) -> bool {
        if room.status != RoomStatus::Started {
            return false;
        }
        let viable = match room.mode {
            ChatMode::Debate => {
                let counts = room.role_counts();
                counts.support > 0 && counts.opposite > 0
            }
            ChatMode::Free => room.active_count() > 0,
        };
        if viable {
            return false;
        }
        self.announce_closing(room, "Not enough participants to continue.")
    }

    /// Broadcasts that the room will close, then schedules its deletion.
    /// A room already scheduled is not announced twice.
    fn announce_closing(&self, room: &Room, reason: &str) -> bool {
        if self.deletions.is_pending(&room.id) {
            return false;
        }
        let message = format!(
            "{reason} The room closes in {} seconds.",
            self.config.deletion_delay.as_secs()
        );
        self.publisher.publish(
            &Topic::Progress(room.id.clone()),
            Broadcast::Interruption {
                message: message.clone(),
            },
        );
        self.publisher.publish(
            &Topic::Chat(room.channel_id.clone()),
            Broadcast::notice(NoticeKind::Event, message),
        );
        self.schedule_deletion(&room.id)
    }

    // -----------------------------------------------------------------------
    // Deletion
    // -----------------------------------------------------------------------

    /// Deletes the room after `deletion_delay`. Idempotent: while a
    /// deletion is pending, further calls return `false` and do nothing.
    pub fn schedule_deletion(&self, room_id: &RoomId) -> bool {
        let this = self.clone();
        let id = room_id.clone();
        let scheduled = self.deletions.schedule_once(room_id.clone(), async move {
            tokio::time::sleep(this.config.deletion_delay).await;
            if let Err(err) = this.delete_room(&id).await {
                error!(room_id = %id, %err, "room deletion failed");
            }
        });
        if scheduled {
            info!(%room_id, delay_secs = self.config.deletion_delay.as_secs(), "room deletion scheduled");
        }
        scheduled
    }

    pub fn deletion_pending(&self, room_id: &RoomId) -> bool {
        self.deletions.is_pending(room_id)
    }

    async fn delete_room(&self, room_id: &RoomId) -> Result<(), RoomError> {
        {
            let _guard = self.locks.lock(room_id).await;
            let Some(room) = self.store.load(room_id)? else {
                self.locks.forget(room_id);
                return Ok(());
            };
            for participant in room.participants() {
                self.store.delete_member(&participant.member_id)?;
                self.grace.cancel(&(room_id.clone(), participant.member_id.clone()));
            }
            self.store.delete_member(&room.owner_id)?;
            self.store.delete(room_id)?;
        }
        self.locks.forget(room_id);
        self.phases.cancel(room_id);
        info!(%room_id, "room deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn load(&self, room_id: &RoomId) -> Result<Room, RoomError> {
        self.store.load(room_id)?.ok_or_else(|| {
            self.locks.forget(room_id);
            RoomError::NotFound(room_id.clone())
        })
    }

    fn publish_roster(&self, room: &Room) {
        self.publisher.publish(
            &Topic::Roster(room.id.clone()),
            Broadcast::Roster {
                participants: room.roster(),
            },
        );
    }
}
