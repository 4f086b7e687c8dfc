//! Service/endpoint observer
//!
//! Polls the API on its own rate-limited cadence and publishes a fresh
//! `UpstreamSet` each cycle.
//!
//! ## How It Works
//!
//! 1. List all Services across namespaces
//! 2. For each Service with a selector, list the Pods it selects
//! 3. Keep Pods in phase `Running` with a Pod IP; pair the IP with the
//!    Service's target port
//! 4. Drop Services that end up with zero endpoints
//! 5. Publish the new set in one swap
//!
//! Any failed list call abandons the cycle before publishing, so the previous
//! snapshot stays in place until a complete listing succeeds.

use crate::apis::cluster::ClusterApi;
use crate::apis::metrics::record_observer_cycle;
use crate::apis::services::snapshot::UpstreamSnapshot;
use crate::error::ControllerError;
use crate::proxy::backend::{Endpoint, ServiceKey, UpstreamSet};
use crate::proxy::rate_limiter::TokenBucket;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pod phase whose IP is routable
const POD_RUNNING: &str = "Running";

/// Background loop resolving Services to live endpoints
pub struct ServiceWatcher {
    cluster: Arc<dyn ClusterApi>,
    snapshot: UpstreamSnapshot,
    limiter: TokenBucket,
}

impl ServiceWatcher {
    pub fn new(cluster: Arc<dyn ClusterApi>, snapshot: UpstreamSnapshot, limiter: TokenBucket) -> Self {
        Self {
            cluster,
            snapshot,
            limiter,
        }
    }

    /// Run forever, one refresh per admitted cycle
    pub async fn run(self) {
        info!("Starting service observer");

        loop {
            self.limiter.accept().await;

            if let Err(e) = self.refresh().await {
                warn!(error = %e, "Service observer cycle failed, keeping previous snapshot");
                record_observer_cycle(e.kind(), None);
            }
        }
    }

    /// Build and publish one snapshot; returns the number of live Services
    pub async fn refresh(&self) -> Result<usize, ControllerError> {
        let upstreams = self.collect().await?;
        let count = upstreams.len();

        self.snapshot.publish(upstreams);
        record_observer_cycle("success", Some(count));
        info!(services = count, "Published service endpoints");

        Ok(count)
    }

    async fn collect(&self) -> Result<UpstreamSet, ControllerError> {
        let services = self.cluster.list_services().await?;
        let mut upstreams = UpstreamSet::new();

        for service in &services {
            let namespace = service.namespace().unwrap_or_else(|| "default".to_string());
            let key = ServiceKey::new(&namespace, &service.name_any());

            let Some(selector) = service
                .spec
                .as_ref()
                .and_then(|spec| spec.selector.as_ref())
                .filter(|selector| !selector.is_empty())
            else {
                debug!(service = %key, "Service has no selector, skipping");
                continue;
            };

            let Some(port) = service_target_port(service) else {
                debug!(service = %key, "Service declares no ports, skipping");
                continue;
            };

            let pods = match self.cluster.list_pods(&namespace, selector).await {
                Ok(pods) => pods,
                Err(e) => {
                    warn!(
                        service = %key,
                        error = %e,
                        "Pod listing failed, aborting observer cycle"
                    );
                    return Err(ControllerError::PodListing {
                        service: key.to_string(),
                        source: Box::new(e),
                    });
                }
            };
            let endpoints = running_endpoints(&pods, port);

            if endpoints.is_empty() {
                debug!(service = %key, "Service has no running pods");
                continue;
            }

            debug!(service = %key, endpoints = endpoints.len(), "Resolved service");
            upstreams.insert(key, endpoints);
        }

        Ok(upstreams)
    }
}

/// Port the Service's Pods listen on
///
/// Uses the first declared port: its numeric `targetPort` if set, otherwise
/// `port`. Named target ports are not resolved; they fall back to `port`.
pub fn service_target_port(service: &Service) -> Option<u16> {
    let port = service.spec.as_ref()?.ports.as_ref()?.first()?;

    let number = match &port.target_port {
        Some(IntOrString::Int(target)) => *target,
        Some(IntOrString::String(name)) => {
            warn!(
                service = %service.name_any(),
                target_port = %name,
                "Named targetPort not supported, using service port {}",
                port.port
            );
            port.port
        }
        None => port.port,
    };

    u16::try_from(number).ok().filter(|p| *p != 0)
}

/// Sorted, de-duplicated endpoints of the Pods in phase `Running`
pub fn running_endpoints(pods: &[Pod], port: u16) -> Vec<Endpoint> {
    let mut endpoints = Vec::new();

    for pod in pods {
        let status = pod.status.as_ref();
        let phase = status.and_then(|s| s.phase.as_deref());

        if phase != Some(POD_RUNNING) {
            debug!(pod = %pod.name_any(), phase = ?phase, "Skipping pod that is not running");
            continue;
        }

        let Some(ip) = status.and_then(|s| s.pod_ip.as_deref()) else {
            debug!(pod = %pod.name_any(), "Skipping running pod without an IP");
            continue;
        };

        match ip.parse::<IpAddr>() {
            Ok(ip) => endpoints.push(Endpoint::new(ip, port)),
            Err(_) => warn!(pod = %pod.name_any(), ip = %ip, "Failed to parse pod IP"),
        }
    }

    endpoints.sort();
    endpoints.dedup();
    endpoints
}
