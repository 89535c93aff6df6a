//! Store-scoped fan-out of dashboard messages.
//!
//! Publishing is best effort: with no subscriber the message is dropped,
//! and slow subscribers observe `Lagged` and skip ahead.

use stall_sdk::objects::BroadcastMessage;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use crate::entities::event_log::EventLogRecord;
use crate::notifications;

pub const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// A message addressed to one store's subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSignal {
    pub store_id: Uuid,
    pub message: BroadcastMessage,
}

#[derive(Debug, Clone)]
pub struct StoreBroadcaster {
    tx: broadcast::Sender<StoreSignal>,
}

impl StoreBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreSignal> {
        self.tx.subscribe()
    }

    fn send(&self, signal: StoreSignal) {
        if self.tx.send(signal).is_err() {
            trace!("No broadcast subscribers, dropping message");
        }
    }

    /// Publish one `notification_received` message per event.
    pub fn publish_events(&self, events: &[EventLogRecord]) {
        for record in events {
            self.send(StoreSignal {
                store_id: record.store_id,
                message: BroadcastMessage::NotificationReceived {
                    notification: notifications::render(&record.event),
                },
            });
        }
    }

    /// Tell the store's dashboards to re-fetch their statistics.
    pub fn stats_updated(&self, store_id: Uuid) {
        self.send(StoreSignal {
            store_id,
            message: BroadcastMessage::StatsUpdated { store_id },
        });
    }
}

impl Default for StoreBroadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_BROADCAST_CAPACITY)
    }
}
