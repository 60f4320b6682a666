//! Player state and per-tick integration

use uuid::Uuid;

use crate::config::WorldBounds;

use super::combat::{CombatSystem, Projectile, WeaponStats};
use super::physics::{BoxSize, Kinematics, PhysicsSystem, Position, Steering};

/// Held keys, written by the event router and read by the tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyState {
    pub left: bool,
    pub right: bool,
    pub forward: bool,
    pub back: bool,
    pub fire: bool,
}

impl KeyState {
    pub fn steering(&self) -> Steering {
        Steering {
            turn: axis(self.left, self.right),
            throttle: axis(self.back, self.forward),
        }
    }
}

fn axis(negative: bool, positive: bool) -> f32 {
    match (negative, positive) {
        (true, false) => -1.0,
        (false, true) => 1.0,
        _ => 0.0,
    }
}

/// Player state (authoritative)
#[derive(Debug, Clone)]
pub struct Player {
    pub id: Uuid,
    pub name: String,

    // Transform
    pub position: Position,
    pub previous_position: Position,
    pub angle: f32,
    pub size: BoxSize,
    pub kinematics: Kinematics,

    // Input
    pub keys: KeyState,

    // Combat
    pub weapon: WeaponStats,
    /// Seconds since the last shot
    pub cooldown: f32,
    pub alive: bool,

    /// Set once the `config` message went out
    pub config_sent: bool,
}

impl Player {
    pub fn new(name: impl Into<String>, position: Position, angle: f32) -> Self {
        let weapon = WeaponStats::default();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            position,
            previous_position: position,
            angle,
            size: BoxSize::default(),
            kinematics: Kinematics::default(),
            keys: KeyState::default(),
            cooldown: weapon.cooldown,
            weapon,
            alive: true,
            config_sent: false,
        }
    }

    /// Advance this player by `dt` seconds.
    /// Returns the projectile fired this tick, if any.
    pub fn update(&mut self, dt: f32, bounds: &WorldBounds) -> Option<Projectile> {
        self.cooldown += dt;

        if !self.alive {
            return None;
        }

        self.previous_position = self.position;

        let (position, angle) = PhysicsSystem::integrate(
            self.position,
            self.angle,
            self.keys.steering(),
            &self.kinematics,
            &self.size,
            bounds,
            dt,
        );
        self.position = position;
        self.angle = angle;

        if self.keys.fire && CombatSystem::can_fire(self.cooldown, &self.weapon) {
            self.cooldown = 0.0;
            return Some(self.shoot());
        }

        None
    }

    fn shoot(&self) -> Projectile {
        let muzzle = CombatSystem::muzzle_position(self.position, &self.size, self.angle, &self.weapon);
        Projectile::new(self.id, muzzle, self.angle, &self.weapon)
    }

    /// Undo this tick's movement
    pub fn roll_back(&mut self) {
        self.position = self.previous_position;
    }

    pub fn kill(&mut self) {
        self.alive = false;
    }
}
