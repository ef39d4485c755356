//! Minimal [`AppRegistry`] for the server binary.
//!
//! The session core treats application handlers as an external capability
//! (spec.md §1: "application-layer channel handlers, invoked through a
//! capability interface"). This binary wires no real applications in; every
//! `StartChannelRequest` resolves to `None` and the session replies with
//! `StartChannelResult::Failure`, which is a normal (non-terminal) outcome
//! per spec.md §4.E. A deployment embedding this crate with real
//! applications would supply its own [`AppRegistry`] here instead.

use std::sync::Arc;

use cdp_core::{AppRegistry, ChannelHandler};

/// An [`AppRegistry`] with no applications registered.
#[derive(Default)]
pub struct NullAppRegistry;

impl AppRegistry for NullAppRegistry {
    fn lookup(&self, app_id: &str, app_name: &str) -> Option<Arc<dyn ChannelHandler>> {
        tracing::info!(app_id, app_name, "no application registered for channel open request");
        None
    }
}
