//! Proxy configuration model
//!
//! A `Backend` is the complete nginx configuration at one instant: which
//! hosts route which path prefixes to which upstream, and the addresses
//! behind each upstream. Both maps are ordered so rendering is stable.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use tracing::warn;

/// Separator between namespace and service name in an upstream name
///
/// Namespaces and Service names are DNS-1123 labels (`[a-z0-9-]`), so `_`
/// can never appear inside either half, and nginx accepts it in upstream names.
pub const SERVICE_KEY_SEPARATOR: char = '_';

/// Stable identity of a backend Service, also used as the nginx upstream name
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceKey(String);

impl ServiceKey {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self(format!("{}{}{}", namespace, SERVICE_KEY_SEPARATOR, name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One reachable backend address
///
/// Displays as `ip:port` (`[ip]:port` for IPv6), which is what nginx expects
/// in an upstream `server` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self(SocketAddr::new(ip, port))
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Live endpoints per Service, as published by the observer
///
/// A Service with no live endpoints is absent, never present with an empty list.
pub type UpstreamSet = BTreeMap<ServiceKey, Vec<Endpoint>>;

/// One routable path rule inside a server block
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    pub path: String,
    pub upstream: ServiceKey,
}

/// Desired (or applied) proxy configuration
///
/// Only `BackendBuilder` creates non-empty values, which guarantees that every
/// upstream a `Location` references exists in `upstreams` with at least one
/// endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backend {
    servers: BTreeMap<String, Vec<Location>>,
    upstreams: BTreeMap<ServiceKey, Vec<Endpoint>>,
}

impl Backend {
    pub fn builder() -> BackendBuilder {
        BackendBuilder::default()
    }

    /// Server blocks keyed by host
    pub fn servers(&self) -> &BTreeMap<String, Vec<Location>> {
        &self.servers
    }

    /// Upstream blocks keyed by upstream name
    pub fn upstreams(&self) -> &BTreeMap<ServiceKey, Vec<Endpoint>> {
        &self.upstreams
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty() && self.upstreams.is_empty()
    }

    /// Structural drift check over both maps
    pub fn differs_from(&self, other: &Backend) -> bool {
        self.servers != other.servers || self.upstreams != other.upstreams
    }
}

/// Accumulates locations and upstreams for one `Backend`
#[derive(Debug, Default)]
pub struct BackendBuilder {
    servers: BTreeMap<String, Vec<Location>>,
    upstreams: BTreeMap<ServiceKey, Vec<Endpoint>>,
}

impl BackendBuilder {
    /// Route `host` + `path` to `upstream`
    ///
    /// The first reference to an upstream records its endpoints; later
    /// references reuse that entry. Returns false (and records nothing) when
    /// `endpoints` is empty.
    pub fn add_location(
        &mut self,
        host: &str,
        path: &str,
        upstream: &ServiceKey,
        endpoints: &[Endpoint],
    ) -> bool {
        if endpoints.is_empty() {
            return false;
        }

        self.upstreams.entry(upstream.clone()).or_insert_with(|| {
            let mut endpoints = endpoints.to_vec();
            endpoints.sort();
            endpoints.dedup();
            endpoints
        });

        self.servers
            .entry(host.to_string())
            .or_default()
            .push(Location {
                path: path.to_string(),
                upstream: upstream.clone(),
            });

        true
    }

    /// Order locations, drop duplicate paths and unreferenced upstreams
    pub fn build(mut self) -> Backend {
        for (host, locations) in self.servers.iter_mut() {
            locations.sort();
            locations.dedup();

            // Sorted by (path, upstream): the first entry for a path wins
            let mut kept: Vec<Location> = Vec::with_capacity(locations.len());
            for location in locations.drain(..) {
                match kept.last() {
                    Some(prev) if prev.path == location.path => {
                        warn!(
                            host = %host,
                            path = %location.path,
                            kept = %prev.upstream,
                            dropped = %location.upstream,
                            "Conflicting upstreams for the same location"
                        );
                    }
                    _ => kept.push(location),
                }
            }
            *locations = kept;
        }

        let servers = self.servers;
        let mut upstreams = self.upstreams;
        upstreams.retain(|key, _| {
            servers
                .values()
                .flatten()
                .any(|location| &location.upstream == key)
        });

        Backend { servers, upstreams }
    }
}
