//! Outbound seam: where broadcasts leave the room layer.

use std::sync::Mutex;

use parley_protocol::{Broadcast, Topic};

/// Delivers a payload to every subscriber of a topic.
///
/// Publishing is fire-and-forget. An implementation that cannot deliver
/// logs and drops; room operations never fail because a subscriber went
/// away.
pub trait Publisher: Send + Sync + 'static {
    fn publish(&self, topic: &Topic, payload: Broadcast);
}

/// A [`Publisher`] that remembers everything it was handed.
///
/// Used by tests to assert on what a room operation broadcast.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    sent: Mutex<Vec<(Topic, Broadcast)>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything published so far, oldest first.
    pub fn sent(&self) -> Vec<(Topic, Broadcast)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Payloads published to `topic`, oldest first.
    pub fn sent_to(&self, topic: &Topic) -> Vec<Broadcast> {
        self.sent()
            .into_iter()
            .filter(|(t, _)| t == topic)
            .map(|(_, b)| b)
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &Topic, payload: Broadcast) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((topic.clone(), payload));
        }
    }
}
