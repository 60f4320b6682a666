//! Application state shared across routes

use std::sync::Arc;

use tracing::info;

use crate::config::Config;
use crate::game::physics::Position;
use crate::game::player::Player;
use crate::game::{Broadcaster, Simulation, SimulationHandle, World};

/// Where the practice bot stands
const PRACTICE_BOT_POSITION: Position = Position::new(250.0, 250.0);

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub world: Arc<World>,
    pub broadcaster: Arc<Broadcaster>,
    pub simulation: SimulationHandle,
}

impl AppState {
    /// Build the state together with the simulation that must be spawned to drive it
    pub fn new(config: Config) -> (Self, Simulation) {
        let config = Arc::new(config);

        // Initialize world registry
        let world = Arc::new(World::new(config.game.bounds));
        let broadcaster = Arc::new(Broadcaster::new());

        if config.game.practice_bot {
            let bot = Player::new("BOT", PRACTICE_BOT_POSITION, 0.0);
            info!(player_id = %bot.id, "Practice bot enabled");
            world.add_player(bot);
        }

        let (simulation, handle) =
            Simulation::new(world.clone(), broadcaster.clone(), config.game.clone());

        let state = Self {
            config,
            world,
            broadcaster,
            simulation: handle,
        };

        (state, simulation)
    }
}
