//! Timing primitives for Parley.
//!
//! Two small pieces that the room layer builds its phase timers, grace
//! checks and delayed deletions on:
//!
//! - [`Countdown`]: a fixed-resolution countdown that yields the time
//!   remaining once at the start and then once per step down to zero.
//! - [`TimerSlots`]: a table of spawned tasks keyed by some id, holding at
//!   most one live task per key.
//!
//! # Integration
//!
//! A phase timer is a [`Countdown`] driven inside a task that lives in a
//! [`TimerSlots`] slot:
//!
//! ```ignore
//! phase_timers.replace(room_id, async move {
//!     let mut countdown = Countdown::new(phase_len, Duration::from_secs(1));
//!     while let Some(tick) = countdown.next_tick().await {
//!         publish(format_hms(tick.remaining));
//!     }
//! });
//! ```

mod countdown;
mod slots;

pub use countdown::{Countdown, CountdownTick, format_hms};
pub use slots::TimerSlots;
