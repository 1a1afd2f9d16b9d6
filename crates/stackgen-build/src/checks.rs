//! Conflict checks run by `issues()` on compiled definitions.
//!
//! Checks only see one service's definition plus the shared build options.
//! Host-port collisions between services, including those caused by port
//! overrides, are found later when the engine compares every compiled
//! definition.

use std::collections::BTreeMap;

use stackgen_core::{BuildOptions, Issue, PortMapping, PortParseError, Protocol, ServiceDefinition};

pub trait Checks: Send + Sync {
    fn check_port_conflicts(
        &self,
        definition: &ServiceDefinition,
        options: &BuildOptions,
        service_name: &str,
    ) -> Vec<Issue> {
        check_port_conflicts(definition, options, service_name)
    }

    fn check_dependency_services(
        &self,
        definition: &ServiceDefinition,
        options: &BuildOptions,
        service_name: &str,
    ) -> Vec<Issue> {
        check_dependency_services(definition, options, service_name)
    }

    fn check_network_conflicts(
        &self,
        definition: &ServiceDefinition,
        options: &BuildOptions,
        service_name: &str,
    ) -> Option<Issue> {
        check_network_conflicts(definition, options, service_name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CommonBuildChecks;

impl Checks for CommonBuildChecks {}

pub fn check_port_conflicts(
    definition: &ServiceDefinition,
    options: &BuildOptions,
    service_name: &str,
) -> Vec<Issue> {
    let mut issues = Vec::new();

    if let Some(own) = options.service(service_name) {
        for spec in own.ports.keys() {
            if PortMapping::parse_container_spec(spec).is_none() {
                issues.push(Issue::invalid_port(
                    service_name,
                    format!("port override key {spec:?} is not a container port"),
                ));
            }
        }
    }

    let mut published: BTreeMap<(u16, Protocol), &str> = BTreeMap::new();
    for entry in &definition.ports {
        let mapping = match PortMapping::parse(entry) {
            Ok(mapping) => mapping,
            Err(PortParseError::Range(_)) => {
                tracing::debug!(service = service_name, entry = %entry, "Skipping port range");
                continue;
            }
            Err(e) => {
                issues.push(Issue::invalid_port(service_name, e.to_string()));
                continue;
            }
        };
        let Some(host) = mapping.host else {
            continue;
        };
        let key = (host, mapping.protocol);

        if let Some(first) = published.insert(key, entry.as_str()) {
            issues.push(Issue::invalid_port(
                service_name,
                format!(
                    "host port {host}/{} is published twice ({first:?} and {entry:?})",
                    mapping.protocol
                ),
            ));
        }
    }

    issues
}

pub fn check_dependency_services(
    definition: &ServiceDefinition,
    options: &BuildOptions,
    service_name: &str,
) -> Vec<Issue> {
    let mut issues: Vec<Issue> = Vec::new();
    for dependency in &definition.depends_on {
        if options.is_selected(dependency) {
            continue;
        }
        if issues.iter().any(|i| i.related.iter().any(|r| r == dependency)) {
            continue;
        }
        issues.push(Issue::missing_dependency(service_name, dependency));
    }
    issues
}

/// `network_mode` excludes `networks`; `service:<name>` needs that service selected.
pub fn check_network_conflicts(
    definition: &ServiceDefinition,
    options: &BuildOptions,
    service_name: &str,
) -> Option<Issue> {
    let mode = definition
        .network_mode
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())?;

    if !definition.networks.is_empty() {
        return Some(Issue::network_conflict(
            service_name,
            format!(
                "network_mode '{mode}' cannot be combined with networks [{}]",
                definition.networks.join(", ")
            ),
        ));
    }

    let target = mode.strip_prefix("service:")?;
    if options.is_selected(target) {
        return None;
    }
    let mut issue = Issue::network_conflict(
        service_name,
        format!("network_mode uses service '{target}', which is not selected"),
    );
    issue.related.push(target.to_owned());
    Some(issue)
}
