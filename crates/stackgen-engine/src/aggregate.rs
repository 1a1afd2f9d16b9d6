//! Cross-service issue aggregation.

use std::collections::BTreeMap;

use stackgen_core::{Issue, Protocol, ServiceDefinition};

/// Host ports published by more than one compiled service, regardless of
/// bind address. One issue per involved service, naming the others, in
/// processing order.
pub fn port_collisions(services: &[(&str, &ServiceDefinition)]) -> Vec<Issue> {
    let mut owners: BTreeMap<(u16, Protocol), Vec<usize>> = BTreeMap::new();
    for (index, (_, definition)) in services.iter().enumerate() {
        for mapping in definition.port_mappings().into_iter().flatten() {
            let Some(host) = mapping.host else {
                continue;
            };
            let list = owners.entry((host, mapping.protocol)).or_default();
            if !list.contains(&index) {
                list.push(index);
            }
        }
    }

    let mut found: Vec<(usize, Issue)> = Vec::new();
    for ((port, protocol), indices) in owners {
        if indices.len() < 2 {
            continue;
        }
        for &index in &indices {
            let others: Vec<&str> = indices
                .iter()
                .filter(|&&other| other != index)
                .map(|&other| services[other].0)
                .collect();
            found.push((index, Issue::port_conflict(services[index].0, port, protocol, &others)));
        }
    }
    found.sort_by_key(|(index, _)| *index);
    found.into_iter().map(|(_, issue)| issue).collect()
}

/// Plugin-reported issues followed by cross-service ones, without exact
/// duplicates (same service, kind and detail).
pub fn merge(reported: Vec<Issue>, cross_service: Vec<Issue>) -> Vec<Issue> {
    let mut merged: Vec<Issue> = Vec::with_capacity(reported.len() + cross_service.len());
    for issue in reported.into_iter().chain(cross_service) {
        let duplicate = merged.iter().any(|seen| {
            seen.service_name == issue.service_name && seen.kind == issue.kind && seen.detail == issue.detail
        });
        if !duplicate {
            merged.push(issue);
        }
    }
    merged
}

/// Any error-severity issue halts artifact assembly.
pub fn is_blocking(issues: &[Issue]) -> bool {
    issues.iter().any(Issue::is_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackgen_core::{IssueKind, Severity};

    fn publishing(ports: &[&str]) -> ServiceDefinition {
        ServiceDefinition {
            ports: ports.iter().map(|p| (*p).to_owned()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn shared_host_port_reports_every_owner() {
        let adguard = publishing(&["53:53/tcp", "53:53/udp", "3001:3000"]);
        let pihole = publishing(&["53:53/tcp", "53:53/udp", "8089:80"]);
        let mosquitto = publishing(&["1883:1883"]);

        let issues = port_collisions(&[("adguardhome", &adguard), ("pihole", &pihole), ("mosquitto", &mosquitto)]);

        assert_eq!(issues.len(), 4);
        assert!(issues.iter().all(|i| i.kind == IssueKind::PortConflict && i.severity == Severity::Error));
        assert_eq!(issues[0].service_name, "adguardhome");
        assert_eq!(issues[0].related, vec!["pihole"]);
        assert_eq!(issues[3].service_name, "pihole");
        assert!(issues.iter().all(|i| !i.references("mosquitto")));
    }

    #[test]
    fn container_only_ports_never_collide() {
        let a = publishing(&["8080"]);
        let b = publishing(&["8080"]);
        assert!(port_collisions(&[("a", &a), ("b", &b)]).is_empty());
    }

    #[test]
    fn same_port_different_protocol_is_fine() {
        let a = publishing(&["53:53/tcp"]);
        let b = publishing(&["53:53/udp"]);
        assert!(port_collisions(&[("a", &a), ("b", &b)]).is_empty());
    }

    #[test]
    fn merge_drops_exact_duplicates_only() {
        let reported = vec![Issue::port_conflict("a", 80, Protocol::Tcp, &["b"]), Issue::missing_dependency("a", "db")];
        let cross = vec![
            Issue::port_conflict("a", 80, Protocol::Tcp, &["b"]),
            Issue::port_conflict("b", 80, Protocol::Tcp, &["a"]),
        ];

        let merged = merge(reported, cross);

        assert_eq!(merged.len(), 3);
        assert_eq!(merged[2].service_name, "b");
        assert!(is_blocking(&merged));
        assert!(!is_blocking(&merged[1..2]));
    }
}
