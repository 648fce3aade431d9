//! Chat handlers: `send_message` and `change_room`.

use std::sync::Arc;

use async_trait::async_trait;
use parlor_core::EventEnvelope;
use parlor_core::events::{
    ChangeRoomEvent, EVENT_NEW_MESSAGE, NewMessageEvent, SendMessageEvent,
};
use tracing::{debug, info};

use crate::dispatch::errors::HandlerError;
use crate::dispatch::registry::EventHandler;
use crate::websocket::Session;

/// Fans a message out as `new_message` to every session sharing the
/// sender's room, sender included.
pub struct SendMessageHandler;

#[async_trait]
impl EventHandler for SendMessageHandler {
    async fn handle(
        &self,
        event: &EventEnvelope,
        session: &Arc<Session>,
    ) -> Result<(), HandlerError> {
        let message: SendMessageEvent = event.decode_payload()?;
        if message.message.is_empty() {
            return Err(HandlerError::InvalidPayload("message must not be empty".into()));
        }

        let manager = session.manager().ok_or(HandlerError::SessionDetached)?;
        let outgoing =
            EventEnvelope::from_payload(EVENT_NEW_MESSAGE, &NewMessageEvent::stamped(message))?;

        let room = session.room();
        let delivered = manager.broadcast_to_room(room.as_deref(), &outgoing).await;
        debug!(room = room.as_deref().unwrap_or("-"), delivered, "message broadcast");
        Ok(())
    }
}

/// Moves the session into the named room.
pub struct ChangeRoomHandler;

#[async_trait]
impl EventHandler for ChangeRoomHandler {
    async fn handle(
        &self,
        event: &EventEnvelope,
        session: &Arc<Session>,
    ) -> Result<(), HandlerError> {
        let ChangeRoomEvent { name } = event.decode_payload::<ChangeRoomEvent>()?;
        if name.trim().is_empty() {
            return Err(HandlerError::InvalidPayload("room name must not be blank".into()));
        }
        info!(connection_id = %session.id(), room = %name, "changed room");
        session.set_room(Some(name));
        Ok(())
    }
}
