//! Keyed, cancellable background tasks.
//!
//! [`TimerSlots`] answers one question for delayed work: "is there already
//! a task for this key?" A room has at most one phase timer and at most
//! one pending deletion, no matter how many code paths ask for one.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::AbortHandle;
use tracing::trace;

#[derive(Debug)]
struct Slot {
    /// Distinguishes this task from a later one under the same key, so a
    /// finishing task never clears its replacement's slot.
    generation: u64,
    handle: AbortHandle,
}

/// A table of spawned tasks, at most one live task per key.
///
/// - [`replace`](Self::replace) aborts whatever runs under the key and
///   spawns the new task.
/// - [`schedule_once`](Self::schedule_once) spawns only if nothing is
///   pending under the key.
/// - [`cancel`](Self::cancel) aborts the task under the key.
///
/// A task that runs to completion frees its own slot. Cloning a
/// `TimerSlots` yields another handle to the same table.
///
/// Must be used from within a Tokio runtime.
#[derive(Debug)]
pub struct TimerSlots<K>
where
    K: Eq + Hash,
{
    slots: Arc<DashMap<K, Slot>>,
    generation: Arc<AtomicU64>,
}

impl<K> Clone for TimerSlots<K>
where
    K: Eq + Hash,
{
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<K> Default for TimerSlots<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            slots: Arc::new(DashMap::new()),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K> TimerSlots<K>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns `task` under `key`, aborting any task already there.
    ///
    /// Once this returns, no code from the aborted task runs past its next
    /// `.await`.
    pub fn replace<F>(&self, key: K, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation();

        // The entry guard is held across the spawn so the new task cannot
        // finish and clear its slot before the slot exists.
        match self.slots.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                occupied.get().handle.abort();
                let handle = self.spawn(key, generation, task);
                occupied.insert(Slot { generation, handle });
                trace!(key = ?occupied.key(), generation, "timer slot replaced");
            }
            Entry::Vacant(vacant) => {
                let handle = self.spawn(key, generation, task);
                vacant.insert(Slot { generation, handle });
                trace!(generation, "timer slot filled");
            }
        }
    }

    /// Spawns `task` under `key` unless a task is already pending there.
    ///
    /// Returns `true` if the task was spawned. When it returns `false` the
    /// task is dropped without ever being polled.
    pub fn schedule_once<F>(&self, key: K, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.slots.entry(key.clone()) {
            Entry::Occupied(_) => {
                trace!(?key, "timer slot already pending");
                false
            }
            Entry::Vacant(vacant) => {
                let generation = self.next_generation();
                let handle = self.spawn(key, generation, task);
                vacant.insert(Slot { generation, handle });
                true
            }
        }
    }

    /// Aborts the task under `key`. Returns `true` if one was pending.
    pub fn cancel(&self, key: &K) -> bool {
        match self.slots.remove(key) {
            Some((_, slot)) => {
                slot.handle.abort();
                trace!(?key, "timer slot cancelled");
                true
            }
            None => false,
        }
    }

    /// Aborts every pending task.
    pub fn cancel_all(&self) {
        self.slots.retain(|_, slot| {
            slot.handle.abort();
            false
        });
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    /// Number of keys with a pending task.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn next_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::Relaxed)
    }

    fn spawn<F>(&self, key: K, generation: u64, task: F) -> AbortHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let slots = Arc::clone(&self.slots);
        tokio::spawn(async move {
            task.await;
            slots.remove_if(&key, |_, slot| slot.generation == generation);
        })
        .abort_handle()
    }
}
