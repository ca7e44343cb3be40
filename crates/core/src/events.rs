//! Event System
//!
//! Provides a pub/sub event bus so consumers can follow issue updates
//! without registering callbacks on the aggregator.

use parking_lot::RwLock;
use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

/// Events published by the issue model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssueEvent {
    /// A recompute pass replaced the current issue list
    Updated {
        /// Pass counter of the snapshot that was published
        generation: u64,
        /// Errors in the full merged set
        errors: usize,
        /// Warnings in the full merged set
        warnings: usize,
        /// Size of the full merged set, before truncation
        total: usize,
        /// Whether an overflow marker was appended
        truncated: bool,
    },
    /// A source was registered
    SourceAdded { name: String },
    /// A source was deregistered
    SourceRemoved { name: String },
    /// A recompute pass failed; the previous list is still current
    RecomputeFailed { message: String, recoverable: bool },
    /// A source's collect call exceeded the slow-source threshold
    SlowSource { name: String, elapsed_ms: u64 },
    /// The aggregator was torn down
    Disposed,
}

/// Subscriber handle for receiving events
#[derive(Clone)]
pub struct EventSubscription {
    receiver: Receiver<IssueEvent>,
}

impl EventSubscription {
    /// Receive the next event (blocking)
    pub fn recv(&self) -> Result<IssueEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv(&self) -> Result<IssueEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Drain every event that is already queued
    pub fn drain(&self) -> Vec<IssueEvent> {
        self.receiver.try_iter().collect()
    }
}

/// Event bus for publish/subscribe pattern
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<IssueEvent>>>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> EventSubscription {
        let (sender, receiver) = unbounded();
        self.subscribers.write().push(sender);
        EventSubscription { receiver }
    }

    /// Emit an event to all subscribers, dropping the ones that hung up
    pub fn emit(&self, event: IssueEvent) -> usize {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        let delivered = subscribers.len();

        debug!("Event {:?} delivered to {} subscribers", event, delivered);
        delivered
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_bus() {
        let bus = EventBus::new();
        let sub1 = bus.subscribe();
        let sub2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.emit(IssueEvent::Disposed);
        assert_eq!(delivered, 2);

        assert_eq!(sub1.try_recv().unwrap(), IssueEvent::Disposed);
        assert_eq!(sub2.try_recv().unwrap(), IssueEvent::Disposed);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        assert_eq!(bus.emit(IssueEvent::SourceAdded { name: "lint".into() }), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.drain().len(), 1);
    }
}
