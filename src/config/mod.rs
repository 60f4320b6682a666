//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

/// World width in world units
pub const WORLD_WIDTH: u32 = 1280;
/// World height in world units
pub const WORLD_HEIGHT: u32 = 720;
/// Distance kept between a fresh spawn point and every world edge
pub const SPAWN_MARGIN: u32 = 200;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated), any origin when unset
    pub client_origin: Option<String>,
    /// Gameplay rules
    pub game: GameConfig,
}

/// Rules the simulation is started with
#[derive(Clone, Debug, PartialEq)]
pub struct GameConfig {
    pub bounds: WorldBounds,
    /// Whether a projectile may hit the player that fired it
    pub self_damage: bool,
    /// Who is told when a player dies
    pub end_notice: EndNotice,
    /// Register an idle target player at startup
    pub practice_bot: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            bounds: WorldBounds::default(),
            self_damage: true,
            end_notice: EndNotice::Shooter,
            practice_bot: false,
        }
    }
}

/// Playable area, anchored at the origin
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WorldBounds {
    pub width: f32,
    pub height: f32,
    pub spawn_margin: f32,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            width: WORLD_WIDTH as f32,
            height: WORLD_HEIGHT as f32,
            spawn_margin: SPAWN_MARGIN as f32,
        }
    }
}

impl WorldBounds {
    /// True when the point lies inside `[0, width] x [0, height]`.
    /// NaN coordinates are never inside.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        (0.0..=self.width).contains(&x) && (0.0..=self.height).contains(&y)
    }
}

/// Recipients of the `end` message when a player is shot down.
/// Defaults to `Shooter`: the notice goes to the connection that fired.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndNotice {
    /// Only the player that died
    Victim,
    /// Only the owner of the projectile
    Shooter,
    /// Every connected player
    All,
}

impl FromStr for EndNotice {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "victim" => Ok(Self::Victim),
            "shooter" => Ok(Self::Shooter),
            "all" => Ok(Self::All),
            _ => Err(ConfigError::Invalid("GAME_END_NOTICE")),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
        };

        let defaults = GameConfig::default();
        let game = GameConfig {
            bounds: WorldBounds::default(),
            self_damage: match env::var("GAME_SELF_DAMAGE") {
                Ok(v) => parse_bool("GAME_SELF_DAMAGE", &v)?,
                Err(_) => defaults.self_damage,
            },
            end_notice: match env::var("GAME_END_NOTICE") {
                Ok(v) => v.parse()?,
                Err(_) => defaults.end_notice,
            },
            practice_bot: match env::var("GAME_PRACTICE_BOT") {
                Ok(v) => parse_bool("GAME_PRACTICE_BOT", &v)?,
                Err(_) => defaults.practice_bot,
            },
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),
            game,
        })
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(key)),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}
