//! Room coordination for Parley.
//!
//! A room is one debate or free discussion. Its state lives in a
//! [`RoomStore`]; this crate decides how that state may change and who
//! hears about it.
//!
//! # Key types
//!
//! - [`RoomCoordinator`]: create, join, team change, ready, start, vote,
//!   chat, rollback, owner edits and queries
//! - [`PresenceMonitor`]: disconnects, reconnect grace, eviction with
//!   ownership failover, and the periodic viability sweep
//! - [`PhaseScheduler`]: the timed debate phases and the final tally
//! - [`Room`]: the aggregate, with its participants mirrored per role in
//!   [`SubRoom`]s
//! - [`RoomStore`] / [`Publisher`]: the persistence and broadcast seams
//!
//! All three services share one [`RoomLocks`] table, so any two changes
//! to the same room are serialized no matter which service makes them.

mod compensation;
mod config;
mod coordinator;
mod error;
mod model;
mod naming;
mod phase;
mod presence;
mod publish;
mod store;
mod subscriptions;

pub use compensation::Compensation;
pub use config::CoordinatorConfig;
pub use coordinator::RoomCoordinator;
pub use error::{RoomError, StoreError};
pub use model::{Member, Participant, RoleCounts, Room, SubRoom, Vote};
pub use naming::generate_nickname;
pub use phase::{DebatePhase, PhaseScheduler, TRANSITIONS};
pub use presence::{PresenceMonitor, SweepReport};
pub use publish::{Publisher, RecordingPublisher};
pub use store::{MemoryStore, RoomLocks, RoomStore};
