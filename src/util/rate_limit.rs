//! Inbound message throttling

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Direct (unkeyed) limiter
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Input frames a single connection may send per second
pub const INPUT_RATE_LIMIT: u32 = 30;

/// Outcome of offering one frame to an [`InputThrottle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Frame dropped. `streak` counts consecutive drops, starting at 1.
    Throttled { streak: u32 },
}

/// Per-connection input throttle. Owned by the connection's reader.
pub struct InputThrottle {
    limiter: Limiter,
    streak: u32,
}

impl InputThrottle {
    pub fn new() -> Self {
        Self::with_rate(INPUT_RATE_LIMIT)
    }

    /// A rate of zero is raised to one frame per second
    pub fn with_rate(per_second: u32) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN));
        Self {
            limiter: RateLimiter::direct(quota),
            streak: 0,
        }
    }

    pub fn admit(&mut self) -> Admission {
        if self.limiter.check().is_ok() {
            self.streak = 0;
            Admission::Allowed
        } else {
            self.streak = self.streak.saturating_add(1);
            Admission::Throttled {
                streak: self.streak,
            }
        }
    }
}

impl Default for InputThrottle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_capped() {
        let mut throttle = InputThrottle::with_rate(5);
        let allowed = (0..20)
            .filter(|_| throttle.admit() == Admission::Allowed)
            .count();
        assert_eq!(allowed, 5);
    }

    #[test]
    fn test_streak_counts_consecutive_drops() {
        let mut throttle = InputThrottle::with_rate(1);
        assert_eq!(throttle.admit(), Admission::Allowed);
        assert_eq!(throttle.admit(), Admission::Throttled { streak: 1 });
        assert_eq!(throttle.admit(), Admission::Throttled { streak: 2 });
    }

    #[test]
    fn test_zero_rate_still_allows_one() {
        let mut throttle = InputThrottle::with_rate(0);
        assert_eq!(throttle.admit(), Admission::Allowed);
    }
}
