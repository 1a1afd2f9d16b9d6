use std::fmt;

use serde::{Deserialize, Serialize};

use crate::service::Protocol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    PortConflict,
    InvalidPort,
    NetworkConflict,
    MissingDependency,
}

/// A conflict or missing dependency reported for one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub service_name: String,
    pub kind: IssueKind,
    pub severity: Severity,
    pub detail: String,
    /// Other services involved in the conflict.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
}

impl Issue {
    pub fn port_conflict(service_name: &str, port: u16, protocol: Protocol, others: &[&str]) -> Self {
        let names = others
            .iter()
            .map(|n| format!("'{n}'"))
            .collect::<Vec<_>>()
            .join(", ");
        Self {
            service_name: service_name.to_owned(),
            kind: IssueKind::PortConflict,
            severity: Severity::Error,
            detail: format!("host port {port}/{protocol} is also published by {names}"),
            related: others.iter().map(|n| (*n).to_owned()).collect(),
        }
    }

    pub fn invalid_port(service_name: &str, detail: impl Into<String>) -> Self {
        Self {
            service_name: service_name.to_owned(),
            kind: IssueKind::InvalidPort,
            severity: Severity::Error,
            detail: detail.into(),
            related: Vec::new(),
        }
    }

    pub fn network_conflict(service_name: &str, detail: impl Into<String>) -> Self {
        Self {
            service_name: service_name.to_owned(),
            kind: IssueKind::NetworkConflict,
            severity: Severity::Error,
            detail: detail.into(),
            related: Vec::new(),
        }
    }

    pub fn missing_dependency(service_name: &str, dependency: &str) -> Self {
        Self {
            service_name: service_name.to_owned(),
            kind: IssueKind::MissingDependency,
            severity: Severity::Warning,
            detail: format!("depends on '{dependency}', which is not selected"),
            related: vec![dependency.to_owned()],
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Whether the issue names `service` as its owner or a related party.
    pub fn references(&self, service: &str) -> bool {
        self.service_name == service || self.related.iter().any(|r| r == service)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => f.write_str("warning"),
            Self::Error => f.write_str("error"),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.service_name, self.detail)
    }
}
