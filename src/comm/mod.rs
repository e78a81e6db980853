//! Transport abstraction, wire helpers and neighbor channels.

pub mod channels;
pub mod communicator;
pub mod wire;
