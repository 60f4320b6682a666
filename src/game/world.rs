//! Shared registry of live players and projectiles

use dashmap::DashMap;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::WorldBounds;

use super::collision::CollisionDetector;
use super::combat::Projectile;
use super::physics::{BoxSize, Position};
use super::player::Player;

/// Spawn points drawn before settling for one that overlaps a player
pub const SPAWN_ATTEMPTS: usize = 32;

/// Registry of every entity in the arena.
///
/// Each map entry is locked independently, so lookups and mutations of one
/// entity never wait on another. Enumeration copies entries out; callers never
/// hold a registry lock while they work with the result.
pub struct World {
    bounds: WorldBounds,
    players: DashMap<Uuid, Player>,
    projectiles: DashMap<Uuid, Projectile>,
    rng: Mutex<ChaCha8Rng>,
}

impl World {
    pub fn new(bounds: WorldBounds) -> Self {
        Self::with_rng(bounds, ChaCha8Rng::from_entropy())
    }

    /// Deterministic spawn positions, for tests and replays
    pub fn with_seed(bounds: WorldBounds, seed: u64) -> Self {
        Self::with_rng(bounds, ChaCha8Rng::seed_from_u64(seed))
    }

    fn with_rng(bounds: WorldBounds, rng: ChaCha8Rng) -> Self {
        Self {
            bounds,
            players: DashMap::new(),
            projectiles: DashMap::new(),
            rng: Mutex::new(rng),
        }
    }

    pub fn bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    /// Generate a spawn position for a new player
    pub fn generate_spawn_position(&self, size: &BoxSize) -> Position {
        let margin = self.bounds.spawn_margin;
        let max_x = (self.bounds.width - margin).min(self.bounds.width - size.width);
        let max_y = (self.bounds.height - margin).min(self.bounds.height - size.height);

        let mut rng = self.rng.lock();
        let x = if max_x > margin { rng.gen_range(margin..max_x) } else { 0.0 };
        let y = if max_y > margin { rng.gen_range(margin..max_y) } else { 0.0 };
        Position::new(x, y)
    }

    /// A spawn point clear of every alive player, if one turns up within
    /// [`SPAWN_ATTEMPTS`] draws. Otherwise the last draw is used.
    pub fn find_free_spawn(&self, size: &BoxSize) -> Position {
        let occupied: Vec<(Position, BoxSize)> = self
            .players
            .iter()
            .filter(|p| p.alive)
            .map(|p| (p.position, p.size))
            .collect();

        let mut position = self.generate_spawn_position(size);
        for _ in 1..SPAWN_ATTEMPTS {
            let clear = occupied
                .iter()
                .all(|(other, other_size)| !CollisionDetector::boxes_overlap(position, size, *other, other_size));
            if clear {
                return position;
            }
            position = self.generate_spawn_position(size);
        }

        warn!(players = occupied.len(), "No free spawn point found, spawning on top of another player");
        position
    }

    /// Create a player at a free spawn point and register it
    pub fn spawn_player(&self, name: impl Into<String>) -> Uuid {
        let size = BoxSize::default();
        let player = Player::new(name, self.find_free_spawn(&size), 0.0);
        let id = player.id;
        self.add_player(player);
        id
    }

    pub fn add_player(&self, player: Player) {
        info!(player_id = %player.id, "Player registered");
        self.players.insert(player.id, player);
    }

    pub fn remove_player(&self, id: &Uuid) -> Option<Player> {
        let removed = self.players.remove(id).map(|(_, p)| p);
        if removed.is_some() {
            info!(player_id = %id, "Player removed");
        }
        removed
    }

    pub fn add_projectile(&self, projectile: Projectile) {
        debug!(projectile_id = %projectile.id, owner_id = %projectile.owner_id, "Projectile spawned");
        self.projectiles.insert(projectile.id, projectile);
    }

    pub fn remove_projectile(&self, id: &Uuid) -> Option<Projectile> {
        self.projectiles.remove(id).map(|(_, p)| p)
    }

    pub fn player(&self, id: &Uuid) -> Option<Player> {
        self.players.get(id).map(|p| p.value().clone())
    }

    /// Run `f` against one player while holding only that player's entry
    pub fn with_player_mut<R>(&self, id: &Uuid, f: impl FnOnce(&mut Player) -> R) -> Option<R> {
        self.players.get_mut(id).map(|mut p| f(p.value_mut()))
    }

    /// Run `f` against every player in turn. `f` must not touch the registry.
    pub fn for_each_player_mut(&self, mut f: impl FnMut(&mut Player)) {
        for mut entry in self.players.iter_mut() {
            f(entry.value_mut());
        }
    }

    /// Run `f` against every projectile in turn. `f` must not touch the registry.
    pub fn for_each_projectile_mut(&self, mut f: impl FnMut(&mut Projectile)) {
        for mut entry in self.projectiles.iter_mut() {
            f(entry.value_mut());
        }
    }

    /// All current players
    pub fn players(&self) -> Vec<Player> {
        self.players.iter().map(|p| p.value().clone()).collect()
    }

    /// All current projectiles
    pub fn projectiles(&self) -> Vec<Projectile> {
        self.projectiles.iter().map(|p| p.value().clone()).collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn projectile_count(&self) -> usize {
        self.projectiles.len()
    }
}
