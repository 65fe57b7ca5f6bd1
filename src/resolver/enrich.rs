use std::sync::Arc;

use super::{CacheError, ResolverCache};

/// Capability contract for events that carry a resolvable uid.
pub trait ResolvableUser {
    fn uid(&self) -> u32;
    fn set_user_name(&mut self, name: String);
}

/// Capability contract for events that carry a resolvable gid.
pub trait ResolvableGroup {
    fn gid(&self) -> u32;
    fn set_group_name(&mut self, name: String);
}

/// Runtime capability probe for arbitrary event types.
///
/// An event may support uid resolution, gid resolution, both, or neither;
/// each probe is independent and defaults to no-match. The enricher never
/// assumes a capability is present.
pub trait Enrichable {
    fn as_user_resolvable(&mut self) -> Option<&mut dyn ResolvableUser> {
        None
    }

    fn as_group_resolvable(&mut self) -> Option<&mut dyn ResolvableGroup> {
        None
    }
}

/// Applies the shared resolution cache to any [`Enrichable`] event,
/// writing resolved names back onto the event in place.
///
/// Clones share the same cache; `start`/`stop` lifecycle calls are per
/// consumer, not per clone.
#[derive(Clone)]
pub struct Enricher {
    cache: Arc<ResolverCache>,
}

impl Enricher {
    pub fn new(cache: Arc<ResolverCache>) -> Self {
        Self { cache }
    }

    /// Activate the underlying cache. The only fallible step in the
    /// enrichment pipeline; per-event resolution always has a fallback.
    pub fn start(&self) -> Result<(), CacheError> {
        self.cache.start()
    }

    /// Release this consumer's hold on the cache.
    pub fn stop(&self) {
        self.cache.stop();
    }

    /// Resolve and set names for whichever capabilities the event has.
    /// A no-op for events with neither.
    pub fn enrich(&self, event: &mut dyn Enrichable) {
        if let Some(user) = event.as_user_resolvable() {
            let name = self.cache.resolve_user(user.uid());
            user.set_user_name(name);
        }

        if let Some(group) = event.as_group_resolvable() {
            let name = self.cache.resolve_group(group.gid());
            group.set_group_name(name);
        }
    }

    /// Enrich every row of a snapshot in place.
    pub fn enrich_all<E: Enrichable>(&self, events: &mut [E]) {
        for event in events {
            self.enrich(event);
        }
    }
}
