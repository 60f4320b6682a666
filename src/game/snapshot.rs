//! Snapshot building and per-recipient delivery

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::util::time::MonotonicMillis;
use crate::ws::protocol::{PlayerView, ProjectileView, ServerMsg};

use super::world::World;

/// Outbound messages buffered per connection before it counts as lagging
pub const OUTBOX_CAPACITY: usize = 64;

/// Everything visible in one tick, captured once and shared by all recipients
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp: u64,
    pub players: Vec<PlayerView>,
    pub bullets: Vec<ProjectileView>,
}

impl Frame {
    /// The `update` message for one recipient, or `None` if it is not registered
    pub fn view_for(&self, recipient: &Uuid) -> Option<ServerMsg> {
        let player = self.players.iter().find(|p| p.id == *recipient)?.clone();
        let other_players = self
            .players
            .iter()
            .filter(|p| p.id != *recipient)
            .cloned()
            .collect();

        Some(ServerMsg::Update {
            timestamp: self.timestamp,
            player,
            other_players,
            bullets: self.bullets.clone(),
        })
    }
}

/// Builds snapshots for network transmission
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    clock: MonotonicMillis,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the registry. Each frame carries a later timestamp than the last.
    pub fn build(&mut self, world: &World) -> Frame {
        Frame {
            timestamp: self.clock.next(),
            players: world.players().iter().map(PlayerView::from).collect(),
            bullets: world.projectiles().iter().map(ProjectileView::from).collect(),
        }
    }
}

/// Why a message did not reach a recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("recipient has no outbox")]
    Unknown,
    #[error("recipient outbox is full")]
    Lagging,
    #[error("recipient outbox is closed")]
    Closed,
}

/// Per-connection outboxes.
///
/// Sending never waits: a slow or vanished connection only loses its own
/// messages. The socket write happens in the connection's writer task, outside
/// every registry lock.
#[derive(Default)]
pub struct Broadcaster {
    outboxes: DashMap<Uuid, mpsc::Sender<ServerMsg>>,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open an outbox for `id`, replacing any previous one
    pub fn register(&self, id: Uuid) -> mpsc::Receiver<ServerMsg> {
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        self.outboxes.insert(id, tx);
        rx
    }

    pub fn unregister(&self, id: &Uuid) {
        self.outboxes.remove(id);
    }

    pub fn recipients(&self) -> Vec<Uuid> {
        self.outboxes.iter().map(|e| *e.key()).collect()
    }

    pub fn send_to(&self, id: &Uuid, msg: ServerMsg) -> Result<(), DeliveryError> {
        // clone the sender so the map entry is released before sending
        let tx = self
            .outboxes
            .get(id)
            .map(|e| e.value().clone())
            .ok_or(DeliveryError::Unknown)?;

        tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Lagging,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Best-effort send; failures are logged and swallowed
    pub fn deliver(&self, id: &Uuid, msg: ServerMsg) {
        match self.send_to(id, msg) {
            Ok(()) => {}
            Err(DeliveryError::Unknown) => {
                debug!(player_id = %id, "No outbox for recipient");
            }
            Err(e) => {
                warn!(player_id = %id, error = %e, "Dropped outbound message");
            }
        }
    }

    pub fn deliver_all(&self, msg: &ServerMsg) {
        for id in self.recipients() {
            self.deliver(&id, msg.clone());
        }
    }

    /// Send every connected recipient its own view of `frame`
    pub fn broadcast_frame(&self, frame: &Frame) {
        for id in self.recipients() {
            if let Some(view) = frame.view_for(&id) {
                self.deliver(&id, view);
            }
        }
    }
}
