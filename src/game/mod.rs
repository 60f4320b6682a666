//! Game simulation modules

pub mod collision;
pub mod combat;
pub mod physics;
pub mod player;
pub mod router;
pub mod simulation;
pub mod snapshot;
pub mod world;

pub use simulation::{Simulation, SimulationHandle};
pub use snapshot::Broadcaster;
pub use world::World;

use crate::ws::protocol::ClientEvent;
use uuid::Uuid;

/// Player input received from WebSocket
#[derive(Debug, Clone)]
pub struct PlayerInput {
    pub player_id: Uuid,
    pub event: ClientEvent,
    pub received_at: u64,
}
