//! Channel handler capability interface.
//!
//! The session core never constructs application behavior itself; it only
//! knows how to look one up and hand it fragments once reassembled. Lookup
//! is synchronous (it's a registry read, not I/O) so it can be called from
//! inside the otherwise-pure [`crate::session::Session::handle_frame`]
//! dispatch; the handler's own `handle` is async because running it is the
//! driver's job, not the state machine's.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

/// A running application instance bound to one channel.
///
/// Invoked once per reassembled session-plane message, in the order
/// messages complete for that channel; never called concurrently with
/// itself for the same channel (concurrency across *different* channels is
/// the driver's choice, not a guarantee this trait makes).
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Deliver one complete, reassembled session-plane message.
    async fn handle(&self, payload: Bytes);
}

/// Looks up the application instance a `StartChannelRequest` names.
///
/// Mirrors the reference codebase's registry-lookup capability interfaces:
/// a thin, synchronous seam the session core depends on without owning.
pub trait AppRegistry: Send + Sync {
    /// Resolve `(app_id, app_name)` to a handler, or `None` if no such
    /// application is registered (the session core replies with
    /// [`cdp_proto::StartChannelResult::Failure`] in that case rather than
    /// treating it as a session-level error).
    fn lookup(&self, app_id: &str, app_name: &str) -> Option<Arc<dyn ChannelHandler>>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use super::{AppRegistry, ChannelHandler};
    use async_trait::async_trait;
    use bytes::Bytes;

    #[derive(Default)]
    pub struct RecordingHandler {
        pub received: Mutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl ChannelHandler for RecordingHandler {
        async fn handle(&self, payload: Bytes) {
            self.received.lock().expect("lock not poisoned").push(payload);
        }
    }

    #[derive(Default)]
    pub struct MapRegistry {
        pub apps: HashMap<(String, String), Arc<dyn ChannelHandler>>,
    }

    impl AppRegistry for MapRegistry {
        fn lookup(&self, app_id: &str, app_name: &str) -> Option<Arc<dyn ChannelHandler>> {
            self.apps.get(&(app_id.to_string(), app_name.to_string())).cloned()
        }
    }
}
