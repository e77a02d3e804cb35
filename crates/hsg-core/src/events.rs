//! In-process event bus. Subscribers observe write and maintenance
//! activity without coupling to the engine's internals; nothing here
//! crosses a process boundary.

use uuid::Uuid;

use crate::config::Sector;

/// Broadcast payloads. Cloned to every subscriber, so keep them cheap.
#[derive(Debug, Clone)]
pub enum HsgEvent {
    MemoryAdded {
        id: Uuid,
        tenant: Option<String>,
        sector: Sector,
    },
    MemoryUpdated {
        id: Uuid,
        tenant: Option<String>,
    },
    MaintenanceOp {
        op: MaintenanceOp,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceOp {
    DecaySweep,
    CoactivationFlush,
    WaypointPrune,
    CacheEviction,
}

/// Thin wrapper over a bounded broadcast channel. A full channel drops
/// the oldest unread event for slow subscribers rather than blocking
/// publishers — see [`tokio::sync::broadcast`].
pub struct EventBus {
    sender: tokio::sync::broadcast::Sender<HsgEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<HsgEvent> {
        self.sender.subscribe()
    }

    /// Publishes an event. Returns the number of receivers it reached;
    /// zero when nobody's listening, which is not an error.
    pub fn publish(&self, event: HsgEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
