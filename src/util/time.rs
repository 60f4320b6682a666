//! Time utilities for game simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Server start time for uptime tracking
static SERVER_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize server start time (call once at startup)
pub fn init_server_time() {
    SERVER_START.get_or_init(Instant::now);
}

/// Get server uptime in seconds
pub fn uptime_secs() -> u64 {
    SERVER_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const TICK_DURATION_MILLIS: u64 = 16; // ~60 ticks per second

/// Largest step the simulation will integrate in one go
pub const MAX_TICK_DELTA: f32 = 1.0;

/// Fixed tick interval
pub fn tick_duration() -> Duration {
    Duration::from_millis(TICK_DURATION_MILLIS)
}

/// Calculate delta time for physics (in seconds)
pub fn tick_delta() -> f32 {
    TICK_DURATION_MILLIS as f32 / 1000.0
}

/// Bring an externally supplied step into `[0, MAX_TICK_DELTA]`.
/// Negative and non-finite steps count as no time passing.
pub fn sanitize_delta(dt: f32) -> f32 {
    if dt.is_finite() && dt > 0.0 {
        dt.min(MAX_TICK_DELTA)
    } else {
        0.0
    }
}

/// Hands out strictly increasing millisecond timestamps, even if the
/// wall clock stalls or steps backwards.
#[derive(Debug, Default)]
pub struct MonotonicMillis {
    last: u64,
}

impl MonotonicMillis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> u64 {
        self.next_from(unix_millis())
    }

    fn next_from(&mut self, now: u64) -> u64 {
        let stamp = now.max(self.last + 1);
        self.last = stamp;
        stamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_delta() {
        assert_eq!(sanitize_delta(0.016), 0.016);
        assert_eq!(sanitize_delta(-1.0), 0.0);
        assert_eq!(sanitize_delta(f32::NAN), 0.0);
        assert_eq!(sanitize_delta(f32::INFINITY), 0.0);
        assert_eq!(sanitize_delta(10.0), MAX_TICK_DELTA);
    }

    #[test]
    fn test_monotonic_millis_never_repeats() {
        let mut clock = MonotonicMillis::new();
        let a = clock.next_from(1_000);
        let b = clock.next_from(1_000);
        let c = clock.next_from(900);
        let d = clock.next_from(5_000);

        assert_eq!(a, 1_000);
        assert_eq!(b, 1_001);
        assert_eq!(c, 1_002);
        assert_eq!(d, 5_000);
    }

    #[test]
    fn test_tick_delta_matches_duration() {
        assert_eq!(tick_duration().as_millis() as u64, TICK_DURATION_MILLIS);
        assert!((tick_delta() - 0.016).abs() < f32::EPSILON);
    }
}
