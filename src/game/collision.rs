//! Collision detection: player blocking and projectile hits

use std::collections::HashSet;

use uuid::Uuid;

use super::combat::Projectile;
use super::physics::{clamp, BoxSize, Position};
use super::player::Player;

/// A projectile striking a player
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub projectile_id: Uuid,
    pub shooter_id: Uuid,
    pub victim_id: Uuid,
}

/// Axis-aligned box of one player, copied out of the registry
#[derive(Debug, Clone, Copy)]
pub struct Body {
    pub id: Uuid,
    pub position: Position,
    /// Where the box stood before this tick's movement
    pub previous: Position,
    pub size: BoxSize,
}

impl From<&Player> for Body {
    fn from(player: &Player) -> Self {
        Self {
            id: player.id,
            position: player.position,
            previous: player.previous_position,
            size: player.size,
        }
    }
}

pub struct CollisionDetector;

impl CollisionDetector {
    /// Inclusive AABB overlap test; touching edges count
    pub fn boxes_overlap(a: Position, a_size: &BoxSize, b: Position, b_size: &BoxSize) -> bool {
        a.x + a_size.width >= b.x
            && a.x <= b.x + b_size.width
            && a.y + a_size.height >= b.y
            && a.y <= b.y + b_size.height
    }

    /// Circle vs box: closest point on the box to the circle centre,
    /// compared by squared distance against the squared radius.
    pub fn projectile_hits_box(projectile: &Projectile, position: Position, size: &BoxSize) -> bool {
        let center = projectile.position;
        if !center.is_finite() {
            return false;
        }

        let closest_x = clamp(center.x, position.x, position.x + size.width);
        let closest_y = clamp(center.y, position.y, position.y + size.height);

        let dx = center.x - closest_x;
        let dy = center.y - closest_y;

        dx * dx + dy * dy <= projectile.radius * projectile.radius
    }

    /// Players that moved into another alive player this tick.
    ///
    /// Every ordered pair is tested, and each offender is reported once no
    /// matter how many boxes it overlaps. A pair that already overlapped at
    /// its previous positions is not blocked, so it can drift apart.
    pub fn blocked_players(bodies: &[Body]) -> HashSet<Uuid> {
        let mut blocked = HashSet::new();

        for a in bodies {
            for b in bodies {
                if a.id == b.id {
                    continue;
                }
                let overlapping = Self::boxes_overlap(a.position, &a.size, b.position, &b.size);
                let was_overlapping = Self::boxes_overlap(a.previous, &a.size, b.previous, &b.size);
                if overlapping && !was_overlapping {
                    blocked.insert(a.id);
                    break;
                }
            }
        }

        blocked
    }

    /// Projectile hits against alive players. Each projectile strikes at most
    /// one player; with `self_damage` off a projectile passes through its owner.
    pub fn projectile_hits(
        projectiles: &[Projectile],
        bodies: &[Body],
        self_damage: bool,
    ) -> Vec<Hit> {
        let mut hits = Vec::new();
        let mut struck: HashSet<Uuid> = HashSet::new();

        for projectile in projectiles {
            for body in bodies {
                if !self_damage && body.id == projectile.owner_id {
                    continue;
                }
                if struck.contains(&body.id) {
                    continue;
                }
                if Self::projectile_hits_box(projectile, body.position, &body.size) {
                    hits.push(Hit {
                        projectile_id: projectile.id,
                        shooter_id: projectile.owner_id,
                        victim_id: body.id,
                    });
                    struck.insert(body.id);
                    break;
                }
            }
        }

        hits
    }
}
