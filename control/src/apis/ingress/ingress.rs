//! Ingress translator
//!
//! Pure function from (Ingresses, upstream snapshot) to a `Backend`. A path
//! whose Service has no live endpoints is skipped on its own; its siblings
//! are still translated. A host with no surviving path gets no server block.
//!
//! Hosts and paths are copied into nginx.conf verbatim, so anything that could
//! end a directive or open a block is rejected before it reaches the builder.

use crate::proxy::backend::{Backend, ServiceKey, UpstreamSet};
use k8s_openapi::api::networking::v1::Ingress;
use kube::ResourceExt;
use tracing::{debug, warn};

/// nginx catch-all server name, used for rules without a host
pub const DEFAULT_SERVER_NAME: &str = "_";

/// Path used when an Ingress path omits one
const DEFAULT_PATH: &str = "/";

/// Build the desired configuration from `ingresses` and `upstreams`
///
/// Output is independent of the order of `ingresses`: servers, upstreams and
/// locations are all kept sorted.
pub fn translate(ingresses: &[Ingress], upstreams: &UpstreamSet) -> Backend {
    let mut builder = Backend::builder();

    for ingress in ingresses {
        let namespace = ingress.namespace().unwrap_or_else(|| "default".to_string());
        let name = ingress.name_any();

        let Some(rules) = ingress.spec.as_ref().and_then(|spec| spec.rules.as_ref()) else {
            debug!(ingress = %format!("{}/{}", namespace, name), "Ingress has no rules");
            continue;
        };

        for rule in rules {
            let host = rule.host.as_deref().unwrap_or(DEFAULT_SERVER_NAME);
            let Some(http) = &rule.http else {
                continue;
            };

            if let Err(validation_error) = validate_host(host) {
                warn!(
                    "Ingress {}/{} has invalid host '{}': {}",
                    namespace, name, host, validation_error
                );
                continue;
            }

            for http_path in &http.paths {
                let path = http_path.path.as_deref().unwrap_or(DEFAULT_PATH);

                if let Err(validation_error) = validate_path(path) {
                    warn!(
                        "Ingress {}/{} host {} has invalid path '{}': {}",
                        namespace, name, host, path, validation_error
                    );
                    continue;
                }

                let Some(service) = &http_path.backend.service else {
                    debug!(
                        ingress = %format!("{}/{}", namespace, name),
                        host = %host,
                        path = %path,
                        "Backend is not a Service, skipping path"
                    );
                    continue;
                };

                let key = ServiceKey::new(&namespace, &service.name);
                let resolved = match upstreams.get(&key) {
                    Some(endpoints) => builder.add_location(host, path, &key, endpoints),
                    None => false,
                };

                if !resolved {
                    debug!(
                        ingress = %format!("{}/{}", namespace, name),
                        host = %host,
                        path = %path,
                        service = %key,
                        "Service has no live endpoints, skipping path"
                    );
                }
            }
        }
    }

    builder.build()
}

/// Validate a location path before it is rendered
///
/// Rules:
/// - Must start with "/"
/// - No whitespace or control characters
/// - None of the characters nginx treats as syntax: `{ } ; " ' # $ \`
fn validate_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err(format!("Path '{}' must start with '/'", path));
    }

    for c in path.chars() {
        if c.is_whitespace() || c.is_control() {
            return Err("Path cannot contain whitespace or control characters".to_string());
        }
        if matches!(c, '{' | '}' | ';' | '"' | '\'' | '#' | '$' | '\\') {
            return Err(format!("Path cannot contain '{}'", c));
        }
    }

    Ok(())
}

/// Validate a server name according to DNS-1123 subdomain rules
///
/// Rules:
/// - Lowercase alphanumeric characters, hyphens, and dots only
/// - Labels must not be empty or start/end with hyphen
/// - Can start with wildcard "*."
/// - Max length 253 characters
/// - The catch-all "_" is always accepted
fn validate_host(host: &str) -> Result<(), String> {
    if host == DEFAULT_SERVER_NAME {
        return Ok(());
    }

    if host.is_empty() {
        return Err("Hostname cannot be empty".to_string());
    }

    if host.len() > 253 {
        return Err(format!("Hostname '{}' exceeds 253 characters", host));
    }

    let labels = host.strip_prefix("*.").unwrap_or(host);
    if labels.is_empty() {
        return Err("Hostname cannot be just '*.'".to_string());
    }

    for label in labels.split('.') {
        if label.is_empty() {
            return Err(format!("Hostname '{}' has an empty label", host));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(format!(
                "Hostname label '{}' cannot start or end with '-'",
                label
            ));
        }
        if let Some(c) = label
            .chars()
            .find(|c| !c.is_ascii_lowercase() && !c.is_ascii_digit() && *c != '-')
        {
            return Err(format!(
                "Hostname '{}' contains invalid character '{}'",
                host, c
            ));
        }
    }

    Ok(())
}

/// Whether `ingress` belongs to `class` (`None` accepts every Ingress)
pub fn matches_class(ingress: &Ingress, class: Option<&str>) -> bool {
    match class {
        None => true,
        Some(class) => {
            ingress
                .spec
                .as_ref()
                .and_then(|spec| spec.ingress_class_name.as_deref())
                == Some(class)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::testing::{http_path, ingress, rule};
    use crate::proxy::backend::{Endpoint, Location};
    use crate::proxy::template::render;
    use k8s_openapi::api::core::v1::TypedLocalObjectReference;
    use k8s_openapi::api::networking::v1::{HTTPIngressPath, IngressBackend};

    fn upstreams(entries: &[(&str, &[&str])]) -> UpstreamSet {
        entries
            .iter()
            .map(|(service, ips)| {
                (
                    ServiceKey::new("default", service),
                    ips.iter()
                        .map(|ip| Endpoint::new(ip.parse().unwrap(), 80))
                        .collect(),
                )
            })
            .collect()
    }

    fn location(path: &str, service: &str) -> Location {
        Location {
            path: path.to_string(),
            upstream: ServiceKey::new("default", service),
        }
    }

    fn addresses(backend: &Backend, service: &str) -> Vec<String> {
        backend.upstreams()[&ServiceKey::new("default", service)]
            .iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn test_two_paths_two_services() {
        let ingresses = vec![ingress(
            "default",
            "site",
            vec![rule(
                Some("a.example.com"),
                vec![http_path("/v1", "foo"), http_path("/v2", "bar")],
            )],
        )];
        let snapshot = upstreams(&[
            ("foo", &["1.2.3.4", "1.2.3.5"]),
            ("bar", &["1.2.3.6", "1.2.3.7"]),
        ]);

        let backend = translate(&ingresses, &snapshot);

        assert_eq!(
            backend.servers()["a.example.com"],
            vec![location("/v1", "foo"), location("/v2", "bar")]
        );
        assert_eq!(addresses(&backend, "foo"), vec!["1.2.3.4:80", "1.2.3.5:80"]);
        assert_eq!(addresses(&backend, "bar"), vec!["1.2.3.6:80", "1.2.3.7:80"]);
    }

    #[test]
    fn test_dead_service_drops_only_its_path() {
        let ingresses = vec![ingress(
            "default",
            "site",
            vec![rule(
                Some("a.example.com"),
                vec![http_path("/v1", "foo"), http_path("/v2", "gone")],
            )],
        )];
        let snapshot = upstreams(&[("foo", &["1.2.3.4"])]);

        let backend = translate(&ingresses, &snapshot);

        assert_eq!(backend.servers()["a.example.com"], vec![location("/v1", "foo")]);
        assert!(!backend
            .upstreams()
            .contains_key(&ServiceKey::new("default", "gone")));
    }

    #[test]
    fn test_host_with_only_dead_paths_is_absent() {
        let ingresses = vec![ingress(
            "default",
            "site",
            vec![
                rule(Some("a.example.com"), vec![http_path("/", "foo")]),
                rule(Some("b.example.com"), vec![http_path("/", "gone")]),
            ],
        )];
        let snapshot = upstreams(&[("foo", &["1.2.3.4"])]);

        let backend = translate(&ingresses, &snapshot);

        assert!(backend.servers().contains_key("a.example.com"));
        assert!(
            !backend.servers().contains_key("b.example.com"),
            "A host with no resolved path must not get a server block"
        );
    }

    #[test]
    fn test_empty_endpoint_list_is_treated_as_missing() {
        let ingresses = vec![ingress(
            "default",
            "site",
            vec![rule(Some("a.example.com"), vec![http_path("/", "foo")])],
        )];
        let snapshot = upstreams(&[("foo", &[])]);

        let backend = translate(&ingresses, &snapshot);

        assert!(backend.is_empty());
    }

    #[test]
    fn test_service_lookup_is_namespaced() {
        let ingresses = vec![ingress(
            "other",
            "site",
            vec![rule(Some("a.example.com"), vec![http_path("/", "foo")])],
        )];
        let snapshot = upstreams(&[("foo", &["1.2.3.4"])]);

        let backend = translate(&ingresses, &snapshot);

        assert!(
            backend.is_empty(),
            "default/foo must not satisfy a reference from namespace other"
        );
    }

    #[test]
    fn test_translation_is_order_independent() {
        let first = ingress(
            "default",
            "one",
            vec![rule(Some("a.example.com"), vec![http_path("/b", "foo")])],
        );
        let second = ingress(
            "default",
            "two",
            vec![
                rule(Some("a.example.com"), vec![http_path("/a", "bar")]),
                rule(Some("c.example.com"), vec![http_path("/", "foo")]),
            ],
        );
        let snapshot = upstreams(&[("foo", &["1.2.3.5", "1.2.3.4"]), ("bar", &["1.2.3.6"])]);

        let forward = translate(&[first.clone(), second.clone()], &snapshot);
        let reverse = translate(&[second, first], &snapshot);

        assert_eq!(forward, reverse);
        assert_eq!(
            forward.servers()["a.example.com"],
            vec![location("/a", "bar"), location("/b", "foo")],
            "Rules for one host from several Ingresses are merged"
        );
    }

    #[test]
    fn test_shared_service_yields_one_upstream() {
        let ingresses = vec![ingress(
            "default",
            "site",
            vec![
                rule(Some("a.example.com"), vec![http_path("/", "foo")]),
                rule(Some("b.example.com"), vec![http_path("/", "foo")]),
            ],
        )];
        let snapshot = upstreams(&[("foo", &["1.2.3.4"])]);

        let backend = translate(&ingresses, &snapshot);

        assert_eq!(backend.upstreams().len(), 1);
        assert_eq!(backend.servers().len(), 2);
    }

    #[test]
    fn test_rule_defaults() {
        let mut no_path = http_path("/", "foo");
        no_path.path = None;
        let ingresses = vec![ingress("default", "site", vec![rule(None, vec![no_path])])];
        let snapshot = upstreams(&[("foo", &["1.2.3.4"])]);

        let backend = translate(&ingresses, &snapshot);

        assert_eq!(backend.servers()[DEFAULT_SERVER_NAME], vec![location("/", "foo")]);
    }

    #[test]
    fn test_resource_backend_is_skipped() {
        let resource_path = HTTPIngressPath {
            path: Some("/static".to_string()),
            path_type: "Prefix".to_string(),
            backend: IngressBackend {
                service: None,
                resource: Some(TypedLocalObjectReference {
                    api_group: Some("k8s.example.com".to_string()),
                    kind: "StorageBucket".to_string(),
                    name: "assets".to_string(),
                }),
            },
        };
        let ingresses = vec![ingress(
            "default",
            "site",
            vec![rule(
                Some("a.example.com"),
                vec![resource_path, http_path("/", "foo")],
            )],
        )];
        let snapshot = upstreams(&[("foo", &["1.2.3.4"])]);

        let backend = translate(&ingresses, &snapshot);

        assert_eq!(backend.servers()["a.example.com"], vec![location("/", "foo")]);
    }

    #[test]
    fn test_matches_class() {
        let mut classed = ingress("default", "site", vec![]);
        if let Some(spec) = classed.spec.as_mut() {
            spec.ingress_class_name = Some("nginx".to_string());
        }
        let unclassed = ingress("default", "other", vec![]);

        assert!(matches_class(&classed, None));
        assert!(matches_class(&unclassed, None));
        assert!(matches_class(&classed, Some("nginx")));
        assert!(!matches_class(&classed, Some("traefik")));
        assert!(!matches_class(&unclassed, Some("nginx")));
    }

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/api/v1/").is_ok(), "Trailing slash is a valid prefix");
        assert!(validate_path("/static/app.js").is_ok());

        assert!(validate_path("api").is_err(), "Path without leading slash");
        assert!(validate_path("").is_err());
        assert!(validate_path("/a b").is_err(), "Whitespace splits the directive");
        assert!(validate_path("/x\n").is_err());
        assert!(validate_path("/x{").is_err());
        assert!(validate_path("/x;").is_err());
        assert!(validate_path("/$uri").is_err(), "Variables must not be expanded");
        assert!(validate_path("/x#comment").is_err());
        assert!(validate_path("/x\"").is_err());
    }

    #[test]
    fn test_validate_host() {
        assert!(validate_host("example.com").is_ok());
        assert!(validate_host("a-1.example.com").is_ok());
        assert!(validate_host("*.example.com").is_ok(), "Wildcard prefix is allowed");
        assert!(validate_host(DEFAULT_SERVER_NAME).is_ok());

        assert!(validate_host("").is_err());
        assert!(validate_host("*.").is_err());
        assert!(validate_host("Example.com").is_err(), "Uppercase is not DNS-1123");
        assert!(validate_host("-a.example.com").is_err());
        assert!(validate_host("a..example.com").is_err());
        assert!(validate_host("a.com; return 200").is_err());
        assert!(validate_host(&"a".repeat(254)).is_err());
    }

    #[test]
    fn test_directive_in_path_is_dropped_and_siblings_render() {
        let ingresses = vec![
            ingress(
                "default",
                "good",
                vec![rule(Some("a.example.com"), vec![http_path("/", "foo")])],
            ),
            ingress(
                "default",
                "bad",
                vec![rule(
                    Some("b.example.com"),
                    vec![
                        http_path("/x { return 200 injected; } location /y", "foo"),
                        http_path("/ok", "foo"),
                    ],
                )],
            ),
        ];
        let snapshot = upstreams(&[("foo", &["1.2.3.4"])]);

        let backend = translate(&ingresses, &snapshot);
        let rendered = render(&backend, 80);

        assert!(!rendered.contains("return 200"), "Got: {}", rendered);
        assert_eq!(backend.servers()["a.example.com"], vec![location("/", "foo")]);
        assert_eq!(
            backend.servers()["b.example.com"],
            vec![location("/ok", "foo")],
            "Only the offending path is dropped"
        );
    }

    #[test]
    fn test_invalid_host_drops_only_its_rule() {
        let ingresses = vec![ingress(
            "default",
            "site",
            vec![
                rule(Some("a.example.com"), vec![http_path("/", "foo")]),
                rule(Some("b.example.com { }"), vec![http_path("/", "foo")]),
            ],
        )];
        let snapshot = upstreams(&[("foo", &["1.2.3.4"])]);

        let backend = translate(&ingresses, &snapshot);

        assert_eq!(backend.servers().len(), 1);
        assert!(backend.servers().contains_key("a.example.com"));
    }
}
