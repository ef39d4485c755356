//! Connected-devices session-core server binary.
//!
//! Production "glue" wrapping [`cdp_core`]'s pure, action-returning session
//! state machine with real I/O: a Tokio TCP listener, system time and OS
//! entropy, and structured logging. Mirrors the reference codebase's own
//! split between a Sans-IO driver crate and a thin server binary that
//! executes its actions - generalized from the reference's Quinn/QUIC
//! transport to plain TCP, since transport discovery/advertisement and
//! concrete socket I/O below the frame boundary are named as external
//! collaborators in spec.md §1, not dictated by it.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod app_registry;
mod connection;
mod system_env;

pub use app_registry::NullAppRegistry;
pub use connection::handle_connection;
pub use system_env::SystemEnv;
