//! Sub-protocol message bodies carried by `Connect` and `Control` frames.
//!
//! `Session` frames carry opaque application bytes (handled by the
//! reassembler upstream) and have no payload type defined here.

pub mod connection;
pub mod control;

pub use connection::{ConnectionMessage, ConnectionMessageKind};
pub use control::{ControlMessage, ControlMessageKind, StartChannelResult};
