//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::game::combat::Projectile;
use crate::game::physics::Position;
use crate::game::player::Player;

/// Keys a client can press or release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Key {
    Left,
    Right,
    Forward,
    Back,
    /// Fire
    Space,
}

/// Input events sent from client to server, decoded once at the boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Set the display name
    Login(String),
    KeyDown(Key),
    KeyUp(Key),
}

/// Raw inbound frame: `{ "type": ..., "payload": ... }`
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

/// Inbound decoding errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid payload for `{kind}` event")]
    InvalidPayload { kind: &'static str },
}

impl ClientEvent {
    /// Decode a text frame.
    /// Unknown event types decode to `Ok(None)` and are meant to be ignored.
    pub fn decode(text: &str) -> Result<Option<Self>, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;

        let event = match envelope.kind.as_str() {
            "login" => match envelope.payload {
                Value::String(name) => ClientEvent::Login(name),
                _ => return Err(ProtocolError::InvalidPayload { kind: "login" }),
            },
            "keydown" => ClientEvent::KeyDown(
                serde_json::from_value(envelope.payload)
                    .map_err(|_| ProtocolError::InvalidPayload { kind: "keydown" })?,
            ),
            "keyup" => ClientEvent::KeyUp(
                serde_json::from_value(envelope.payload)
                    .map_err(|_| ProtocolError::InvalidPayload { kind: "keyup" })?,
            ),
            _ => return Ok(None),
        };

        Ok(Some(event))
    }

    /// Key releases must always be applied, or the key stays held
    pub fn is_release(&self) -> bool {
        matches!(self, ClientEvent::KeyUp(_))
    }
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// World dimensions, sent once after login
    Config { game_width: u32, game_height: u32 },

    /// Per-recipient world snapshot, sent every tick
    Update {
        /// Milliseconds since the Unix epoch, strictly increasing per server
        timestamp: u64,
        player: PlayerView,
        #[serde(rename = "otherPlayers")]
        other_players: Vec<PlayerView>,
        bullets: Vec<ProjectileView>,
    },

    /// The round is over for this recipient
    End { data: String },

    /// An inbound frame could not be decoded
    Rejected { reason: String },
}

/// Player state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub id: Uuid,
    pub name: String,
    pub position: Position,
    /// Heading in radians
    pub angle: f32,
    pub width: f32,
    pub height: f32,
}

impl From<&Player> for PlayerView {
    fn from(p: &Player) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            position: p.position,
            angle: p.angle,
            width: p.size.width,
            height: p.size.height,
        }
    }
}

/// Projectile state in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileView {
    pub id: Uuid,
    pub position: Position,
    pub angle: f32,
    pub bullet_type: String,
    pub speed: f32,
}

impl From<&Projectile> for ProjectileView {
    fn from(p: &Projectile) -> Self {
        Self {
            id: p.id,
            position: p.position,
            angle: p.angle,
            bullet_type: p.bullet_type.to_string(),
            speed: p.speed,
        }
    }
}
