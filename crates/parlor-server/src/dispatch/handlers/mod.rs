//! Built-in event handlers.

pub mod chat;

use parlor_core::events::{EVENT_CHANGE_ROOM, EVENT_SEND_MESSAGE};

use super::registry::EventRegistry;

/// Register every built-in handler.
pub fn register_all(registry: &mut EventRegistry) {
    registry.register(EVENT_SEND_MESSAGE, chat::SendMessageHandler);
    registry.register(EVENT_CHANGE_ROOM, chat::ChangeRoomHandler);
}
