//! Component E: the per-session channel registry.
//!
//! A session's channel ids are 1-based, monotonically increasing, and never
//! reused, matching spec.md 4.E. Insertion order is tracked separately from
//! the id map so teardown can dispose channels in the order they were
//! opened without pulling in an ordered-map dependency the rest of the
//! workspace doesn't otherwise need.

use std::{collections::HashMap, sync::Arc};

use crate::channel::{AppRegistry, ChannelHandler};

/// One open channel: the resolved application handler plus the channel id
/// it was allocated under.
pub struct Channel {
    /// This channel's id within its owning session.
    pub id: u64,
    /// The application instance messages on this channel are delivered to.
    pub handler: Arc<dyn ChannelHandler>,
}

/// Allocates and tracks the channels open within one session.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<u64, Channel>,
    insertion_order: Vec<u64>,
    next_id: u64,
}

impl ChannelRegistry {
    /// Build an empty registry. The first channel opened gets id `1`.
    #[must_use]
    pub fn new() -> Self {
        Self { channels: HashMap::new(), insertion_order: Vec::new(), next_id: 1 }
    }

    /// Resolve `(app_id, app_name)` against `apps` and, if found, allocate
    /// and register a new channel. Returns `None` on an app-lookup miss
    /// (the caller turns that into a `StartChannelResult::Failure` reply,
    /// not a session-level error — spec.md 4.F names no error kind for it).
    pub fn start_channel(&mut self, app_id: &str, app_name: &str, apps: &dyn AppRegistry) -> Option<u64> {
        let handler = apps.lookup(app_id, app_name)?;
        let id = self.next_id;
        #[allow(clippy::expect_used)]
        {
            self.next_id = self.next_id.checked_add(1).expect("channel ids don't wrap within a session's lifetime");
        }
        self.channels.insert(id, Channel { id, handler });
        self.insertion_order.push(id);
        Some(id)
    }

    /// Look up an open channel by id.
    #[must_use]
    pub fn get(&self, channel_id: u64) -> Option<&Channel> {
        self.channels.get(&channel_id)
    }

    /// Remove and dispose all channels, returning their handlers in
    /// insertion order, per spec.md 4.E's teardown ordering requirement.
    pub fn dispose_all(&mut self) -> Vec<Arc<dyn ChannelHandler>> {
        let order = std::mem::take(&mut self.insertion_order);
        order.into_iter().filter_map(|id| self.channels.remove(&id)).map(|channel| channel.handler).collect()
    }

    /// Number of channels currently open.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channels are currently open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::test_support::{MapRegistry, RecordingHandler};

    fn registry_with_app(app_id: &str, app_name: &str) -> MapRegistry {
        let mut apps = MapRegistry::default();
        apps.apps.insert(
            (app_id.to_string(), app_name.to_string()),
            Arc::new(RecordingHandler::default()) as Arc<dyn ChannelHandler>,
        );
        apps
    }

    #[test]
    fn channel_ids_are_one_based_and_monotonic() {
        let apps = registry_with_app("app.foo", "Foo");
        let mut channels = ChannelRegistry::new();

        let first = channels.start_channel("app.foo", "Foo", &apps).unwrap();
        let second = channels.start_channel("app.foo", "Foo", &apps).unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 2);
        assert_eq!(channels.len(), 2);
    }

    #[test]
    fn unknown_app_returns_none_without_allocating() {
        let apps = registry_with_app("app.foo", "Foo");
        let mut channels = ChannelRegistry::new();

        assert!(channels.start_channel("app.bar", "Bar", &apps).is_none());
        assert!(channels.is_empty());
    }

    #[test]
    fn dispose_all_returns_handlers_in_insertion_order() {
        let mut apps = MapRegistry::default();
        apps.apps.insert(
            ("a".to_string(), "A".to_string()),
            Arc::new(RecordingHandler::default()) as Arc<dyn ChannelHandler>,
        );
        apps.apps.insert(
            ("b".to_string(), "B".to_string()),
            Arc::new(RecordingHandler::default()) as Arc<dyn ChannelHandler>,
        );
        let mut channels = ChannelRegistry::new();
        let first = channels.start_channel("a", "A", &apps).unwrap();
        let second = channels.start_channel("b", "B", &apps).unwrap();

        let disposed = channels.dispose_all();
        assert_eq!(disposed.len(), 2);
        assert!(channels.is_empty());
        assert!(first < second);
    }

    #[test]
    fn get_returns_the_registered_channel() {
        let apps = registry_with_app("app.foo", "Foo");
        let mut channels = ChannelRegistry::new();
        let id = channels.start_channel("app.foo", "Foo", &apps).unwrap();

        assert_eq!(channels.get(id).expect("channel should exist").id, id);
        assert!(channels.get(id + 1).is_none());
    }
}
