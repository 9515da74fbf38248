//! Outbound messaging port.
//!
//! The controller never talks to a broker directly. The environment supplies
//! a `Publisher` that knows how to put an [`Outbound`] on the wire.

use crate::reports::Outbound;

pub type PortError = Box<dyn std::error::Error + Send + Sync>;

pub trait Publisher {
    /// Send one message. A failure drops the message; the caller keeps going.
    fn publish(&mut self, msg: &Outbound) -> Result<(), PortError>;

    fn is_connected(&self) -> bool {
        true
    }

    /// Try to re-establish the broker session. Only called while idle.
    fn reconnect(&mut self) -> Result<(), PortError> {
        Ok(())
    }
}
