//! Geometry helpers and movement integration

use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::config::WorldBounds;

/// A point in world coordinates. Every entity owns its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Move `distance` units along `angle`
    pub fn advanced(self, angle: f32, distance: f32) -> Self {
        Self {
            x: self.x + angle.cos() * distance,
            y: self.y + angle.sin() * distance,
        }
    }
}

/// Clamp `value` into `[lo, hi]`; `lo` wins if the range is inverted
pub fn clamp(value: f32, lo: f32, hi: f32) -> f32 {
    lo.max(value.min(hi))
}

/// Rotate the vector `(dx, dy)` by `angle` and place it relative to `origin`
pub fn rotate_around(origin: Position, dx: f32, dy: f32, angle: f32) -> Position {
    let (sin, cos) = angle.sin_cos();
    Position {
        x: origin.x + dx * cos - dy * sin,
        y: origin.y + dx * sin + dy * cos,
    }
}

/// Bring an angle into `[0, 2π)`
pub fn normalize_angle(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

/// Per-player movement constants
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kinematics {
    /// Linear speed in units per second
    pub speed: f32,
    /// Turn rate in radians per second
    pub angular_speed: f32,
}

impl Default for Kinematics {
    fn default() -> Self {
        Self {
            speed: 250.0,
            angular_speed: 3.0,
        }
    }
}

/// Axis-aligned box size of a player
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxSize {
    pub width: f32,
    pub height: f32,
}

impl Default for BoxSize {
    fn default() -> Self {
        Self {
            width: 50.0,
            height: 50.0,
        }
    }
}

impl BoxSize {
    pub fn half_diagonal(&self) -> f32 {
        (self.width * self.width + self.height * self.height).sqrt() / 2.0
    }
}

/// Directional input reduced to signed axes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Steering {
    /// -1 turns left, 1 turns right
    pub turn: f32,
    /// -1 backs up, 1 drives forward
    pub throttle: f32,
}

/// Movement system for player transforms
pub struct PhysicsSystem;

impl PhysicsSystem {
    /// Integrate one step of movement.
    /// Returns (new_position, new_angle). The position is kept inside
    /// `[0, width - box.width] x [0, height - box.height]`.
    pub fn integrate(
        position: Position,
        angle: f32,
        steering: Steering,
        kinematics: &Kinematics,
        size: &BoxSize,
        bounds: &WorldBounds,
        dt: f32,
    ) -> (Position, f32) {
        let new_angle = normalize_angle(angle + steering.turn * kinematics.angular_speed * dt);
        let new_angle = if new_angle.is_finite() { new_angle } else { 0.0 };

        let mut moved = position.advanced(new_angle, steering.throttle * kinematics.speed * dt);
        if !moved.is_finite() {
            moved = position;
        }

        (Self::clamp_to_world(moved, size, bounds), new_angle)
    }

    /// Keep a box-anchored position inside the world
    pub fn clamp_to_world(position: Position, size: &BoxSize, bounds: &WorldBounds) -> Position {
        let max_x = (bounds.width - size.width).max(0.0);
        let max_y = (bounds.height - size.height).max(0.0);
        // corrupt coordinates reset to the origin corner
        let x = if position.x.is_finite() { clamp(position.x, 0.0, max_x) } else { 0.0 };
        let y = if position.y.is_finite() { clamp(position.y, 0.0, max_y) } else { 0.0 };
        Position { x, y }
    }
}
