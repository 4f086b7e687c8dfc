//! Published upstream snapshot
//!
//! The observer is the only writer and replaces the whole `UpstreamSet` in one
//! pointer swap; readers get an `Arc` to a complete, immutable value.

use crate::proxy::backend::{Endpoint, ServiceKey, UpstreamSet};
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Shared handle to the latest `UpstreamSet`
#[derive(Clone)]
pub struct UpstreamSnapshot {
    current: Arc<ArcSwap<UpstreamSet>>,
}

impl UpstreamSnapshot {
    /// Starts empty: every lookup misses until the first publish
    pub fn new() -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(UpstreamSet::new())),
        }
    }

    /// Replace the published set
    pub fn publish(&self, upstreams: UpstreamSet) {
        self.current.store(Arc::new(upstreams));
    }

    /// The latest complete set; never blocks on the observer
    pub fn load(&self) -> Arc<UpstreamSet> {
        self.current.load_full()
    }

    /// Endpoints for `key` in the latest set
    pub fn lookup(&self, key: &ServiceKey) -> Option<Vec<Endpoint>> {
        self.current.load().get(key).cloned()
    }
}

impl Default for UpstreamSnapshot {
    fn default() -> Self {
        Self::new()
    }
}
