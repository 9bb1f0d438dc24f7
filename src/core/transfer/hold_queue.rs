//! FIFO wait list of callers awaiting a representative.
//!
//! Shared by every call; all operations take one lock so two representatives
//! can never be handed the same head-of-queue caller.

use std::collections::VecDeque;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct QueuedCall {
    call_id: String,
    enqueued_at: Instant,
}

/// Queue entry as reported by [`HoldQueue::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub call_id: String,
    pub position: usize,
    pub waited_secs: u64,
}

#[derive(Debug)]
pub struct HoldQueue {
    calls: Mutex<VecDeque<QueuedCall>>,
    /// Bumped on every change so held callers can re-announce their position.
    changes: watch::Sender<u64>,
}

impl Default for HoldQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl HoldQueue {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            calls: Mutex::new(VecDeque::new()),
            changes,
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    /// Adds the call to the back of the queue; returns its 1-based position.
    ///
    /// Enqueuing a call that is already waiting keeps its place.
    pub fn enqueue(&self, call_id: &str) -> usize {
        let position = {
            let mut calls = self.calls.lock();
            if let Some(index) = calls.iter().position(|c| c.call_id == call_id) {
                return index + 1;
            }
            calls.push_back(QueuedCall {
                call_id: call_id.to_string(),
                enqueued_at: Instant::now(),
            });
            calls.len()
        };
        debug!(call_id, position, "Caller placed on hold");
        self.notify();
        position
    }

    /// Removes and returns the earliest-enqueued caller.
    pub fn dequeue(&self) -> Option<String> {
        let call = self.calls.lock().pop_front()?;
        debug!(call_id = %call.call_id, "Caller taken off hold");
        self.notify();
        Some(call.call_id)
    }

    /// 1-based position of the call, if it is waiting.
    pub fn position(&self, call_id: &str) -> Option<usize> {
        self.calls
            .lock()
            .iter()
            .position(|c| c.call_id == call_id)
            .map(|index| index + 1)
    }

    /// Removes the call wherever it is; returns whether it was queued.
    pub fn remove(&self, call_id: &str) -> bool {
        let removed = {
            let mut calls = self.calls.lock();
            let before = calls.len();
            calls.retain(|c| c.call_id != call_id);
            calls.len() != before
        };
        if removed {
            debug!(call_id, "Caller released from hold queue");
            self.notify();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.lock().is_empty()
    }

    pub fn snapshot(&self) -> Vec<QueueEntry> {
        let now = Instant::now();
        self.calls
            .lock()
            .iter()
            .enumerate()
            .map(|(index, call)| QueueEntry {
                call_id: call.call_id.clone(),
                position: index + 1,
                waited_secs: now.duration_since(call.enqueued_at).as_secs(),
            })
            .collect()
    }

    /// Receiver that changes whenever the queue does.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}
