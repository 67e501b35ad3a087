//! Fixed-resolution countdown.

use std::time::Duration;

use tokio::time::{self, Instant as TokioInstant};
use tracing::{trace, warn};

/// One tick of a [`Countdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    /// Monotonically increasing tick number (starts at 1).
    pub tick: u64,
    /// Time left when this tick fired. Zero on the last tick.
    pub remaining: Duration,
    /// How many steps were skipped because this tick fired late.
    pub steps_skipped: u64,
}

/// Counts down from a total duration in fixed steps.
///
/// The first call to [`next_tick`](Self::next_tick) resolves immediately
/// with the full duration remaining. Every later call sleeps one step and
/// yields one step less, down to zero. After the zero tick the countdown
/// is finished and `next_tick` returns `None`.
///
/// ```text
/// total = 3s, resolution = 1s
///
///   t=0  ──► 3s
///   t=1  ──► 2s
///   t=2  ──► 1s
///   t=3  ──► 0s
///   then None
/// ```
///
/// A zero-length countdown yields exactly one tick (remaining 0).
///
/// ## Overrun policy
///
/// If the task driving the countdown wakes up a full step late or more,
/// the missed steps are skipped rather than replayed, so the countdown
/// still ends on schedule. A warning is logged when that happens.
#[derive(Debug)]
pub struct Countdown {
    resolution: Duration,
    /// Steps still to count down; `None` once the zero tick was yielded.
    steps_left: Option<u64>,
    /// When the next step is due. `None` before the first tick.
    next_due: Option<TokioInstant>,
    tick_count: u64,
}

impl Countdown {
    /// Creates a countdown over `total`, stepping by `resolution`.
    ///
    /// `total` is rounded up to a whole number of steps. A zero
    /// `resolution` is treated as one millisecond.
    pub fn new(total: Duration, resolution: Duration) -> Self {
        let resolution = resolution.max(Duration::from_millis(1));
        let steps = total.as_nanos().div_ceil(resolution.as_nanos());
        let steps = u64::try_from(steps).unwrap_or(u64::MAX);

        Self {
            resolution,
            steps_left: Some(steps),
            next_due: None,
            tick_count: 0,
        }
    }

    /// A countdown over `total` in one-second steps.
    pub fn seconds(total: Duration) -> Self {
        Self::new(total, Duration::from_secs(1))
    }

    /// Waits for the next tick. Returns `None` once the countdown is over.
    pub async fn next_tick(&mut self) -> Option<CountdownTick> {
        let steps_left = self.steps_left?;

        let Some(due) = self.next_due else {
            // First tick fires immediately with the full duration.
            self.next_due = Some(TokioInstant::now() + self.resolution);
            return Some(self.emit(steps_left, 0));
        };

        if steps_left == 0 {
            self.steps_left = None;
            return None;
        }

        time::sleep_until(due).await;

        let late_by = TokioInstant::now().saturating_duration_since(due);
        let skipped = u64::try_from(late_by.as_nanos() / self.resolution.as_nanos())
            .unwrap_or(u64::MAX);
        if skipped > 0 {
            warn!(
                tick = self.tick_count + 1,
                skipped,
                late_ms = late_by.as_secs_f64() * 1000.0,
                "countdown overrun, skipping ahead"
            );
        }

        let advanced = skipped.saturating_add(1);
        let remaining = steps_left.saturating_sub(advanced);
        self.next_due = Some(due + self.resolution * u32::try_from(advanced).unwrap_or(u32::MAX));
        Some(self.emit(remaining, skipped))
    }

    fn emit(&mut self, steps: u64, skipped: u64) -> CountdownTick {
        self.tick_count += 1;
        self.steps_left = Some(steps);
        let remaining = self.resolution * u32::try_from(steps).unwrap_or(u32::MAX);

        trace!(tick = self.tick_count, remaining_ms = remaining.as_millis() as u64, "countdown tick");

        CountdownTick {
            tick: self.tick_count,
            remaining,
            steps_skipped: skipped,
        }
    }

    /// Ticks yielded so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// `true` once the zero tick has been yielded.
    pub fn is_finished(&self) -> bool {
        self.steps_left.is_none_or(|s| s == 0 && self.next_due.is_some())
    }

    pub fn resolution(&self) -> Duration {
        self.resolution
    }
}

/// Formats a duration as `HH:MM:SS`, truncating sub-second precision.
///
/// Hours are not wrapped, so 100 hours prints as `100:00:00`.
pub fn format_hms(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_hms_pads_fields() {
        assert_eq!(format_hms(Duration::ZERO), "00:00:00");
        assert_eq!(format_hms(Duration::from_secs(59)), "00:00:59");
        assert_eq!(format_hms(Duration::from_secs(3 * 60)), "00:03:00");
        assert_eq!(format_hms(Duration::from_secs(3661)), "01:01:01");
    }

    #[test]
    fn test_format_hms_truncates_millis() {
        assert_eq!(format_hms(Duration::from_millis(1999)), "00:00:01");
    }

    #[test]
    fn test_new_rounds_total_up_to_whole_steps() {
        let c = Countdown::new(Duration::from_millis(1500), Duration::from_secs(1));
        assert_eq!(c.steps_left, Some(2));
        assert!(!c.is_finished());
    }
}
