// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! # Change Notifier
//!
//! Boundary for broadcasting session updates to interested listeners.
//! The notifier is injected into the state machine at construction, so
//! tests can substitute a recording or no-op implementation instead of a
//! live broadcast channel.
//!
//! Delivery is fire-and-forget: no acknowledgment, no ordering guarantee
//! across subscribers, at-least-once semantics. Consumers must treat every
//! event as a complete-state snapshot, not a diff.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::ScheduleSession;

/// Event name carried on every session update
pub const SCHEDULE_UPDATED: &str = "schedule:updated";

/// A full-session snapshot published after a mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEvent {
    /// Event name, always [`SCHEDULE_UPDATED`]
    pub event: String,
    /// Complete state of the session after the mutation
    pub session: ScheduleSession,
}

impl ScheduleEvent {
    /// Wrap a session snapshot in an update event
    pub fn updated(session: ScheduleSession) -> Self {
        Self {
            event: SCHEDULE_UPDATED.to_string(),
            session,
        }
    }
}

/// Publisher interface handed to the state machine
pub trait ChangeNotifier: Send + Sync {
    /// Publish an event to whoever is listening; never blocks, never fails
    fn publish(&self, event: ScheduleEvent);
}

/// Notifier backed by a tokio broadcast channel
///
/// A send with no active receivers is not an error; the event is simply
/// dropped, matching the fire-and-forget contract.
pub struct BroadcastNotifier {
    sender: broadcast::Sender<ScheduleEvent>,
}

impl BroadcastNotifier {
    /// Create a notifier with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to subsequent events
    pub fn subscribe(&self) -> broadcast::Receiver<ScheduleEvent> {
        self.sender.subscribe()
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn publish(&self, event: ScheduleEvent) {
        let receivers = self.sender.receiver_count();
        if self.sender.send(event).is_err() {
            debug!("schedule update dropped, no subscribers");
        } else {
            debug!("schedule update broadcast to {} subscribers", receivers);
        }
    }
}

/// Notifier that discards every event
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn publish(&self, _event: ScheduleEvent) {}
}

/// Notifier that records every event, for assertions in tests
#[derive(Default)]
pub struct RecordingNotifier {
    events: std::sync::Mutex<Vec<ScheduleEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything published so far
    pub fn events(&self) -> Vec<ScheduleEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ChangeNotifier for RecordingNotifier {
    fn publish(&self, event: ScheduleEvent) {
        self.events.lock().unwrap().push(event);
    }
}
