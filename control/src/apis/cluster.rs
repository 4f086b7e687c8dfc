//! Kubernetes API access
//!
//! The controller only ever lists: Services and Pods for the observer,
//! Ingresses for the driver loop. Nothing is written back to the cluster.

use crate::error::ControllerError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::{Api, ListParams};
use kube::Client;
use std::collections::BTreeMap;

/// Read-only view of the cluster objects the controller consumes
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// All Services across all namespaces
    async fn list_services(&self) -> Result<Vec<Service>, ControllerError>;

    /// Pods in `namespace` matching every label in `selector`
    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, ControllerError>;

    /// All Ingresses across all namespaces
    async fn list_ingresses(&self) -> Result<Vec<Ingress>, ControllerError>;
}

/// `ClusterApi` backed by a live `kube::Client`
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl KubeCluster {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn list_services(&self) -> Result<Vec<Service>, ControllerError> {
        let api: Api<Service> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, ControllerError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = ListParams::default().labels(&label_selector(selector));
        Ok(api.list(&params).await?.items)
    }

    async fn list_ingresses(&self) -> Result<Vec<Ingress>, ControllerError> {
        let api: Api<Ingress> = Api::all(self.client.clone());
        Ok(api.list(&ListParams::default()).await?.items)
    }
}

/// Equality-based label selector string (`k1=v1,k2=v2`)
pub fn label_selector(selector: &BTreeMap<String, String>) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}
