//! Applies decoded client events to the owning player

use crate::ws::protocol::{ClientEvent, Key};

use super::player::Player;

/// What the caller should do after an event was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Only input state changed
    Input,
    /// The player logged in and may need the world config
    Login,
}

pub struct EventRouter;

impl EventRouter {
    /// Apply `event` to `player`. Touches nothing but that player.
    pub fn route(player: &mut Player, event: ClientEvent) -> Routed {
        match event {
            ClientEvent::Login(name) => {
                player.name = name;
                Routed::Login
            }
            ClientEvent::KeyDown(key) => {
                Self::set_key(player, key, true);
                Routed::Input
            }
            ClientEvent::KeyUp(key) => {
                Self::set_key(player, key, false);
                Routed::Input
            }
        }
    }

    fn set_key(player: &mut Player, key: Key, pressed: bool) {
        let keys = &mut player.keys;
        match key {
            Key::Left => keys.left = pressed,
            Key::Right => keys.right = pressed,
            Key::Forward => keys.forward = pressed,
            Key::Back => keys.back = pressed,
            Key::Space => keys.fire = pressed,
        }
    }
}
