//! Envelope routing: the type → handler table and the built-in handlers.

pub mod errors;
pub mod handlers;
pub mod registry;

pub use errors::{DispatchError, HandlerError};
pub use registry::{EventHandler, EventRegistry};
