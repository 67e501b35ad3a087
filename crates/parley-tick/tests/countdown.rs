//! Integration tests for the countdown clock.
//!
//! Every async test runs with paused time, so `sleep_until` resolves as
//! soon as the runtime is idle and elapsed times are exact.

use std::time::Duration;

use parley_tick::{Countdown, format_hms};
use tokio::time::Instant;

// =========================================================================
// Helpers
// =========================================================================

async fn drain(countdown: &mut Countdown) -> Vec<u64> {
    let mut seen = Vec::new();
    while let Some(tick) = countdown.next_tick().await {
        seen.push(tick.remaining.as_secs());
    }
    seen
}

// =========================================================================
// Tick sequence
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_countdown_yields_full_then_each_second_to_zero() {
    let start = Instant::now();
    let mut countdown = Countdown::seconds(Duration::from_secs(3));

    assert_eq!(drain(&mut countdown).await, vec![3, 2, 1, 0]);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
    assert!(countdown.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_first_tick_is_immediate() {
    let start = Instant::now();
    let mut countdown = Countdown::seconds(Duration::from_secs(90));

    let tick = countdown.next_tick().await.unwrap();

    assert_eq!(tick.tick, 1);
    assert_eq!(tick.remaining, Duration::from_secs(90));
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_zero_length_countdown_yields_exactly_one_tick() {
    let mut countdown = Countdown::seconds(Duration::ZERO);

    assert_eq!(drain(&mut countdown).await, vec![0]);
    assert_eq!(countdown.tick_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_finished_countdown_keeps_returning_none() {
    let mut countdown = Countdown::seconds(Duration::from_secs(1));
    drain(&mut countdown).await;

    assert!(countdown.next_tick().await.is_none());
    assert!(countdown.next_tick().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sub_second_resolution() {
    let mut countdown =
        Countdown::new(Duration::from_millis(300), Duration::from_millis(100));

    let mut seen = Vec::new();
    while let Some(tick) = countdown.next_tick().await {
        seen.push(tick.remaining.as_millis());
    }
    assert_eq!(seen, vec![300, 200, 100, 0]);
}

// =========================================================================
// Overrun
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_late_wakeup_skips_missed_steps() {
    let start = Instant::now();
    let mut countdown = Countdown::seconds(Duration::from_secs(3));
    countdown.next_tick().await.unwrap();

    // Stall the driving task for two and a half steps.
    tokio::time::advance(Duration::from_millis(2500)).await;

    let late = countdown.next_tick().await.unwrap();
    assert_eq!(late.remaining, Duration::from_secs(1));
    assert_eq!(late.steps_skipped, 1);

    let last = countdown.next_tick().await.unwrap();
    assert_eq!(last.remaining, Duration::ZERO);
    // The schedule is kept: the countdown still ends at t = 3s.
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

// =========================================================================
// Formatting
// =========================================================================

#[test]
fn test_format_hms_of_debate_phase() {
    assert_eq!(format_hms(Duration::from_secs(2 * 60 + 5)), "00:02:05");
}
