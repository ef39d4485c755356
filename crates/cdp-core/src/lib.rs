//! Session core for a Connected Devices protocol endpoint.
//!
//! Owns everything past the wire codec (`cdp-proto`) and the cryptographic
//! primitives (`cdp-crypto`): the handshake state machine, the per-session
//! channel and reassembly tables, and the process-wide session registry that
//! resolves inbound frames to the session they belong to. Transport I/O,
//! scheduling, and application behavior are all external collaborators this
//! crate depends on through narrow traits ([`Environment`], [`AppRegistry`],
//! [`ChannelHandler`]) rather than owning them.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod channel_registry;
pub mod env;
pub mod error;
pub mod reassembler;
pub mod session;
pub mod session_registry;

pub use channel::{AppRegistry, ChannelHandler};
pub use channel_registry::{Channel, ChannelRegistry};
pub use env::Environment;
pub use error::SessionError;
pub use reassembler::Reassembler;
pub use session::{DEFAULT_FRAGMENT_SIZE, OutboundFrame, Session, SessionAction, SessionState};
pub use session_registry::{FIRST_LOCAL_SESSION_ID, SessionRegistry};
