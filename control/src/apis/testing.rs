//! In-memory `ClusterApi` and object builders for unit tests

use crate::apis::cluster::ClusterApi;
use crate::error::ControllerError;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, PodStatus, Service, ServicePort, ServiceSpec};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ErrorResponse;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Fake cluster with switchable API failures
#[derive(Default)]
pub struct FakeCluster {
    pub services: Mutex<Vec<Service>>,
    pub pods: Mutex<Vec<Pod>>,
    pub ingresses: Mutex<Vec<Ingress>>,
    pub fail_services: AtomicBool,
    pub fail_pods: AtomicBool,
    pub fail_ingresses: AtomicBool,
}

impl FakeCluster {
    pub fn set_services(&self, services: Vec<Service>) {
        *self.services.lock().unwrap() = services;
    }

    pub fn set_pods(&self, pods: Vec<Pod>) {
        *self.pods.lock().unwrap() = pods;
    }

    pub fn set_ingresses(&self, ingresses: Vec<Ingress>) {
        *self.ingresses.lock().unwrap() = ingresses;
    }
}

#[async_trait]
impl ClusterApi for FakeCluster {
    async fn list_services(&self) -> Result<Vec<Service>, ControllerError> {
        if self.fail_services.load(Ordering::SeqCst) {
            return Err(api_error());
        }
        Ok(self.services.lock().unwrap().clone())
    }

    async fn list_pods(
        &self,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<Pod>, ControllerError> {
        if self.fail_pods.load(Ordering::SeqCst) {
            return Err(api_error());
        }
        let pods = self.pods.lock().unwrap();
        Ok(pods
            .iter()
            .filter(|pod| pod.metadata.namespace.as_deref() == Some(namespace))
            .filter(|pod| {
                let labels = pod.metadata.labels.clone().unwrap_or_default();
                selector.iter().all(|(k, v)| labels.get(k) == Some(v))
            })
            .cloned()
            .collect())
    }

    async fn list_ingresses(&self) -> Result<Vec<Ingress>, ControllerError> {
        if self.fail_ingresses.load(Ordering::SeqCst) {
            return Err(api_error());
        }
        Ok(self.ingresses.lock().unwrap().clone())
    }
}

/// What the API server returns while it is unavailable
pub fn api_error() -> ControllerError {
    ControllerError::Kubernetes(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: "the server is currently unable to handle the request".to_string(),
        reason: "ServiceUnavailable".to_string(),
        code: 503,
    }))
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Service `namespace/name` selecting `app=<name>` on `port` -> `target_port`
pub fn service(namespace: &str, name: &str, port: i32, target_port: Option<IntOrString>) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(labels(&[("app", name)])),
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port,
                target_port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        status: None,
    }
}

/// Pod labelled `app=<app>` in `phase` with `ip`
pub fn pod(namespace: &str, name: &str, app: &str, phase: &str, ip: Option<&str>) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels(&[("app", app)])),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            pod_ip: ip.map(str::to_string),
            ..Default::default()
        }),
    }
}

/// HTTP path routed to a Service backend
pub fn http_path(path: &str, service: &str) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some(path.to_string()),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_string(),
                port: Some(ServiceBackendPort {
                    number: Some(80),
                    name: None,
                }),
            }),
            resource: None,
        },
    }
}

pub fn rule(host: Option<&str>, paths: Vec<HTTPIngressPath>) -> IngressRule {
    IngressRule {
        host: host.map(str::to_string),
        http: Some(HTTPIngressRuleValue { paths }),
    }
}

pub fn ingress(namespace: &str, name: &str, rules: Vec<IngressRule>) -> Ingress {
    Ingress {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        spec: Some(IngressSpec {
            rules: Some(rules),
            ..Default::default()
        }),
        status: None,
    }
}
