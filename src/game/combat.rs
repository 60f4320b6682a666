//! Weapons and projectiles

use uuid::Uuid;

use crate::config::WorldBounds;

use super::physics::{rotate_around, BoxSize, Position};

/// The only projectile kind currently fired
pub const BULLET_TYPE_COMMON: &str = "common";

/// Weapon stats shared by every player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeaponStats {
    /// Projectile speed
    pub projectile_speed: f32,
    /// Minimum time between shots (seconds)
    pub cooldown: f32,
    /// Projectile hitbox radius
    pub projectile_radius: f32,
}

impl Default for WeaponStats {
    fn default() -> Self {
        Self {
            projectile_speed: 300.0,
            cooldown: 0.5,
            projectile_radius: 10.0,
        }
    }
}

/// Active projectile in the game
#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub position: Position,
    /// Heading inherited from the firer, never changes
    pub angle: f32,
    pub speed: f32,
    pub radius: f32,
    pub bullet_type: &'static str,
}

impl Projectile {
    /// Create a new projectile
    pub fn new(owner_id: Uuid, position: Position, angle: f32, stats: &WeaponStats) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            position,
            angle,
            speed: stats.projectile_speed,
            radius: stats.projectile_radius,
            bullet_type: BULLET_TYPE_COMMON,
        }
    }

    /// Move along the heading, returns false once the projectile has left the world
    pub fn advance(&mut self, dt: f32, bounds: &WorldBounds) -> bool {
        self.position = self.position.advanced(self.angle, self.speed * dt);
        bounds.contains(self.position.x, self.position.y)
    }
}

/// Combat system for cooldowns and projectile spawning
pub struct CombatSystem;

impl CombatSystem {
    /// Check if a player can fire (cooldown check)
    pub fn can_fire(cooldown: f32, stats: &WeaponStats) -> bool {
        cooldown >= stats.cooldown
    }

    /// Where a shot leaves a player's box.
    ///
    /// The offset is measured from the box centre along the heading and is long
    /// enough that the projectile starts clear of the box at any angle.
    pub fn muzzle_position(
        position: Position,
        size: &BoxSize,
        angle: f32,
        stats: &WeaponStats,
    ) -> Position {
        let center = Position::new(position.x + size.width / 2.0, position.y + size.height / 2.0);
        let offset = size.half_diagonal() + stats.projectile_radius + 1.0;
        rotate_around(center, offset, 0.0, angle)
    }
}
