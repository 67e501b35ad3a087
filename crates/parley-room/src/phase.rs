//! Timed debate phases.
//!
//! A started debate walks a fixed sequence of phases, each a countdown
//! published to the room's progress topic, and ends with the vote tally.
//!
//! ```text
//! positiveEntry → negativeQuestioning → negativeEntry → positiveQuestioning
//!   → positiveRebuttal → negativeRebuttal → votingTime → result
//! ```
//!
//! The sequence is data ([`TRANSITIONS`]) rather than control flow, so
//! it can be checked on its own.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parley_protocol::{Broadcast, ChatMode, DebateSettings, RoomId, RoomStatus, Topic};
use parley_tick::{Countdown, TimerSlots, format_hms};
use tracing::{debug, error, info};

use crate::{CoordinatorConfig, Publisher, RoomError, RoomLocks, RoomStore};

// ---------------------------------------------------------------------------
// DebatePhase
// ---------------------------------------------------------------------------

/// One stage of a debate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DebatePhase {
    PositiveEntry,
    NegativeQuestioning,
    NegativeEntry,
    PositiveQuestioning,
    PositiveRebuttal,
    NegativeRebuttal,
    VotingTime,
    /// Terminal: the tally has been published.
    Result,
}

/// Every allowed `(from, to)` step. Each phase appears once on the left,
/// except `Result`, which has no successor.
pub const TRANSITIONS: &[(DebatePhase, DebatePhase)] = &[
    (DebatePhase::PositiveEntry, DebatePhase::NegativeQuestioning),
    (DebatePhase::NegativeQuestioning, DebatePhase::NegativeEntry),
    (DebatePhase::NegativeEntry, DebatePhase::PositiveQuestioning),
    (DebatePhase::PositiveQuestioning, DebatePhase::PositiveRebuttal),
    (DebatePhase::PositiveRebuttal, DebatePhase::NegativeRebuttal),
    (DebatePhase::NegativeRebuttal, DebatePhase::VotingTime),
    (DebatePhase::VotingTime, DebatePhase::Result),
];

impl DebatePhase {
    pub const FIRST: DebatePhase = DebatePhase::PositiveEntry;

    pub fn next(self) -> Option<DebatePhase> {
        TRANSITIONS
            .iter()
            .find(|(from, _)| *from == self)
            .map(|(_, to)| *to)
    }

    /// The phase name as published in progress payloads.
    pub fn as_str(self) -> &'static str {
        match self {
            DebatePhase::PositiveEntry => "positiveEntry",
            DebatePhase::NegativeQuestioning => "negativeQuestioning",
            DebatePhase::NegativeEntry => "negativeEntry",
            DebatePhase::PositiveQuestioning => "positiveQuestioning",
            DebatePhase::PositiveRebuttal => "positiveRebuttal",
            DebatePhase::NegativeRebuttal => "negativeRebuttal",
            DebatePhase::VotingTime => "votingTime",
            DebatePhase::Result => "result",
        }
    }

    /// How long this phase runs. `None` for `Result`, which is not timed.
    pub fn length(self, settings: &DebateSettings, voting_time: Duration) -> Option<Duration> {
        let minutes = match self {
            DebatePhase::PositiveEntry => settings.positive_entry,
            DebatePhase::NegativeQuestioning => settings.negative_questioning,
            DebatePhase::NegativeEntry => settings.negative_entry,
            DebatePhase::PositiveQuestioning => settings.positive_questioning,
            DebatePhase::PositiveRebuttal => settings.positive_rebuttal,
            DebatePhase::NegativeRebuttal => settings.negative_rebuttal,
            DebatePhase::VotingTime => return Some(voting_time),
            DebatePhase::Result => return None,
        };
        Some(Duration::from_secs(u64::from(minutes) * 60))
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const TICK_MESSAGE: &str = "Timer is running.";
const RESULT_MESSAGE: &str = "Timer has ended.";

// ---------------------------------------------------------------------------
// PhaseScheduler
// ---------------------------------------------------------------------------

/// Drives the phases of started debates, one timer task per room.
///
/// Starting a room's timer replaces any timer already running for it, so
/// at most one phase countdown per room is ever live. Cancelling aborts
/// the task at its next await; no tick is published afterwards.
#[derive(Clone)]
pub struct PhaseScheduler {
    store: Arc<dyn RoomStore>,
    publisher: Arc<dyn Publisher>,
    locks: RoomLocks,
    config: CoordinatorConfig,
    timers: TimerSlots<RoomId>,
    current: Arc<DashMap<RoomId, DebatePhase>>,
}

impl PhaseScheduler {
    pub fn new(
        store: Arc<dyn RoomStore>,
        publisher: Arc<dyn Publisher>,
        locks: RoomLocks,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            locks,
            config,
            timers: TimerSlots::new(),
            current: Arc::new(DashMap::new()),
        }
    }

    /// Starts the phase sequence for a debate room.
    ///
    /// # Errors
    /// [`RoomError::ModeMismatch`] for free rooms and
    /// [`RoomError::InvalidSettings`] when the room has no debate settings.
    pub fn start(&self, room_id: &RoomId, mode: ChatMode, settings: Option<DebateSettings>) -> Result<(), RoomError> {
        if mode != ChatMode::Debate {
            return Err(RoomError::ModeMismatch);
        }
        let settings = settings
            .ok_or_else(|| RoomError::InvalidSettings("debate settings are missing".into()))?;

        self.current.insert(room_id.clone(), DebatePhase::FIRST);
        let this = self.clone();
        let id = room_id.clone();
        self.timers.replace(room_id.clone(), async move {
            this.run(id, settings).await;
        });
        info!(%room_id, "debate timer started");
        Ok(())
    }

    /// The phase a room's timer is in, if one is running.
    pub fn current_phase(&self, room_id: &RoomId) -> Option<DebatePhase> {
        self.current.get(room_id).map(|p| *p)
    }

    pub fn is_running(&self, room_id: &RoomId) -> bool {
        self.timers.is_pending(room_id)
    }

    /// Stops a room's timer. Returns `true` if one was running.
    pub fn cancel(&self, room_id: &RoomId) -> bool {
        self.current.remove(room_id);
        let cancelled = self.timers.cancel(room_id);
        if cancelled {
            debug!(%room_id, "debate timer cancelled");
        }
        cancelled
    }

    async fn run(&self, room_id: RoomId, settings: DebateSettings) {
        let topic = Topic::Progress(room_id.clone());
        let mut phase = DebatePhase::FIRST;

        while let Some(length) = phase.length(&settings, self.config.voting_time) {
            self.current.insert(room_id.clone(), phase);
            debug!(%room_id, %phase, secs = length.as_secs(), "phase started");

            let mut countdown = Countdown::new(length, self.config.tick_resolution);
            while let Some(tick) = countdown.next_tick().await {
                self.publisher.publish(
                    &topic,
                    Broadcast::Progress {
                        phase: phase.as_str().to_owned(),
                        remaining_time: format_hms(tick.remaining),
                        message: TICK_MESSAGE.to_owned(),
                    },
                );
            }

            match phase.next() {
                Some(next) => phase = next,
                None => break,
            }
        }

        if let Err(err) = self.finish(&room_id).await {
            error!(%room_id, %err, "failed to close debate");
        }
        self.current.remove(&room_id);
    }

    /// Publishes the tally and marks the room `ENDED`.
    async fn finish(&self, room_id: &RoomId) -> Result<(), RoomError> {
        let _guard = self.locks.lock(room_id).await;
        let Some(mut room) = self.store.load(room_id)? else {
            self.locks.forget(room_id);
            debug!(%room_id, "room gone before the debate ended");
            return Ok(());
        };

        self.current.insert(room_id.clone(), DebatePhase::Result);
        let result = room.vote.tally();
        self.publisher.publish(
            &Topic::Progress(room_id.clone()),
            Broadcast::Result {
                phase: DebatePhase::Result.as_str().to_owned(),
                remaining_time: format_hms(Duration::ZERO),
                message: RESULT_MESSAGE.to_owned(),
                result: result.clone(),
            },
        );

        if room.status.can_transition_to(RoomStatus::Ended) {
            room.status = RoomStatus::Ended;
            room.touch();
            self.store.save(&room)?;
        }
        info!(
            %room_id,
            support = result.support,
            opposite = result.opposite,
            mvp = result.mvp.as_deref().unwrap_or("-"),
            "debate ended"
        );
        Ok(())
    }
}
