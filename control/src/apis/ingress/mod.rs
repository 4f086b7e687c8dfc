//! Ingress support (networking.k8s.io/v1)
//!
//! Translates Ingress routing rules plus the observer's snapshot into the
//! desired nginx `Backend`.

#[allow(clippy::module_inception)]
pub mod ingress;

pub use ingress::{matches_class, translate};
