//! Integration tests for keyed timer slots.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parley_tick::TimerSlots;

// =========================================================================
// Helpers
// =========================================================================

/// A task that waits `secs` and then adds `amount` to `counter`.
fn bump_after(
    counter: &Arc<AtomicU32>,
    secs: u64,
    amount: u32,
) -> impl Future<Output = ()> + Send + 'static {
    let counter = Arc::clone(counter);
    async move {
        tokio::time::sleep(Duration::from_secs(secs)).await;
        counter.fetch_add(amount, Ordering::SeqCst);
    }
}

// =========================================================================
// replace
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_replace_aborts_previous_task() {
    let slots = TimerSlots::new();
    let counter = Arc::new(AtomicU32::new(0));

    slots.replace("room", bump_after(&counter, 5, 1));
    slots.replace("room", bump_after(&counter, 5, 10));
    tokio::time::sleep(Duration::from_secs(6)).await;

    assert_eq!(counter.load(Ordering::SeqCst), 10);
    assert!(!slots.is_pending(&"room"));
}

#[tokio::test(start_paused = true)]
async fn test_replace_on_different_keys_runs_both() {
    let slots = TimerSlots::new();
    let counter = Arc::new(AtomicU32::new(0));

    slots.replace("a", bump_after(&counter, 1, 1));
    slots.replace("b", bump_after(&counter, 1, 1));
    assert_eq!(slots.len(), 2);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(slots.is_empty());
}

// =========================================================================
// schedule_once
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_schedule_once_is_idempotent_while_pending() {
    let slots = TimerSlots::new();
    let counter = Arc::new(AtomicU32::new(0));

    assert!(slots.schedule_once("room", bump_after(&counter, 5, 1)));
    assert!(!slots.schedule_once("room", bump_after(&counter, 5, 1)));
    assert!(slots.is_pending(&"room"));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_schedule_once_after_completion_spawns_again() {
    let slots = TimerSlots::new();
    let counter = Arc::new(AtomicU32::new(0));

    slots.schedule_once("room", bump_after(&counter, 1, 1));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert!(slots.schedule_once("room", bump_after(&counter, 1, 1)));
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

// =========================================================================
// cancel
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_cancel_prevents_task_from_running() {
    let slots = TimerSlots::new();
    let counter = Arc::new(AtomicU32::new(0));

    slots.schedule_once(7u32, bump_after(&counter, 5, 1));
    assert!(slots.cancel(&7));
    assert!(!slots.cancel(&7));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_all_empties_table() {
    let slots = TimerSlots::new();
    let counter = Arc::new(AtomicU32::new(0));

    for key in 0..4u32 {
        slots.replace(key, bump_after(&counter, 1, 1));
    }
    slots.cancel_all();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(slots.is_empty());
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clone_shares_the_same_table() {
    let slots = TimerSlots::new();
    let other = slots.clone();
    let counter = Arc::new(AtomicU32::new(0));

    slots.schedule_once("room", bump_after(&counter, 1, 1));
    assert!(other.is_pending(&"room"));
    assert!(other.cancel(&"room"));
    assert!(!slots.is_pending(&"room"));
}
