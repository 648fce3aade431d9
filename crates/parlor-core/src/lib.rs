//! # parlor-core
//!
//! Shared vocabulary for the parlor chat gateway.
//!
//! - **Envelope protocol**: [`events::EventEnvelope`] and the payload types
//!   carried inside it (`send_message`, `new_message`, `change_room`)
//! - **Branded IDs**: [`ids::ConnectionId`] for live sessions
//! - **Errors**: [`errors::EnvelopeError`] for frame and payload decoding
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;

pub use errors::EnvelopeError;
pub use events::EventEnvelope;
pub use ids::ConnectionId;
