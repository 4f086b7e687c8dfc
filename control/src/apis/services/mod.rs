//! Service/endpoint discovery
//!
//! - `ServiceWatcher`: background loop resolving Services to running Pods
//! - `UpstreamSnapshot`: the single-slot handoff it publishes into

pub mod snapshot;
pub mod watcher;

pub use snapshot::UpstreamSnapshot;
pub use watcher::ServiceWatcher;
