use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// One compose service, as loaded from a template and rewritten by the
/// compile mutators.
///
/// Keys stackgen does not model (`cap_add`, `healthcheck`, ...) are kept
/// in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    /// `KEY=VALUE` entries, in template order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
    /// Bumped by every mutation that changes the definition.
    #[serde(skip)]
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub driver: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub options: BTreeMap<String, String>,
}

impl ServiceDefinition {
    /// Fields every service needs before it can be written to the stack.
    pub const REQUIRED_FIELDS: &'static [&'static str] = &["container_name", "image", "restart"];

    /// Parse a `service.yml` template.
    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Required fields that are unset or blank.
    pub fn missing_required_fields(&self) -> Vec<&'static str> {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());

        let mut missing = Vec::new();
        if !present(&self.container_name) {
            missing.push("container_name");
        }
        if !present(&self.image) {
            missing.push("image");
        }
        if !present(&self.restart) {
            missing.push("restart");
        }
        missing
    }

    /// Value of an environment entry, if set.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.environment.iter().find_map(|entry| {
            let (k, v) = split_env(entry);
            (k == key).then_some(v)
        })
    }

    /// Set an environment entry in place, keeping its position if present.
    pub fn upsert_env_var(&mut self, key: &str, value: &str) {
        let rendered = format!("{key}={value}");
        match self
            .environment
            .iter_mut()
            .find(|entry| split_env(entry).0 == key)
        {
            Some(entry) => *entry = rendered,
            None => self.environment.push(rendered),
        }
    }

    /// Published port mappings; entries that fail to parse are returned as errors.
    pub fn port_mappings(&self) -> Vec<Result<PortMapping, PortParseError>> {
        self.ports.iter().map(|p| PortMapping::parse(p)).collect()
    }

    /// Host paths of bind mounts (`./volumes/x:/data` yields `./volumes/x`).
    pub fn bind_mount_sources(&self) -> Vec<&str> {
        self.volumes
            .iter()
            .filter_map(|v| v.split_once(':').map(|(host, _)| host))
            .filter(|host| host.starts_with('.') || host.starts_with('/'))
            .collect()
    }
}

fn split_env(entry: &str) -> (&str, &str) {
    entry.split_once('=').unwrap_or((entry, ""))
}

// ── Ports ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "tcp" => Some(Self::Tcp),
            "udp" => Some(Self::Udp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// A `[ip:]host:container[/proto]` port entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub host_ip: Option<String>,
    /// `None` when only the container port is given (ephemeral host port).
    pub host: Option<u16>,
    pub container: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortParseError {
    #[error("port range {0:?} is not checked")]
    Range(String),

    #[error("invalid port entry {entry:?}: {reason}")]
    Invalid { entry: String, reason: &'static str },
}

impl PortMapping {
    pub fn parse(entry: &str) -> Result<Self, PortParseError> {
        let invalid = |reason| PortParseError::Invalid {
            entry: entry.to_owned(),
            reason,
        };

        let trimmed = entry.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty entry"));
        }

        let (spec, protocol) = match trimmed.rsplit_once('/') {
            Some((spec, proto)) => (spec, Protocol::parse(proto).ok_or(invalid("unknown protocol"))?),
            None => (trimmed, Protocol::Tcp),
        };

        if spec.contains('-') {
            return Err(PortParseError::Range(entry.to_owned()));
        }

        let parts: Vec<&str> = spec.split(':').collect();
        let (host_ip, host, container) = match parts.as_slice() {
            [container] => (None, None, *container),
            [host, container] => (None, Some(*host), *container),
            [ip, host, container] => (Some((*ip).to_owned()), Some(*host), *container),
            _ => return Err(invalid("too many ':' separators")),
        };

        let container = parse_port(container).ok_or(invalid("container port out of range"))?;
        let host = match host {
            Some(raw) if !raw.is_empty() => {
                Some(parse_port(raw).ok_or(invalid("host port out of range"))?)
            }
            _ => None,
        };

        Ok(Self {
            host_ip,
            host,
            container,
            protocol,
        })
    }

    /// Container side as written in build options keys, e.g. `3000/tcp`.
    pub fn container_spec(&self) -> String {
        format!("{}/{}", self.container, self.protocol)
    }

    /// Parse a build-options port key (`3000`, `53/udp`) into port + protocol.
    pub fn parse_container_spec(spec: &str) -> Option<(u16, Protocol)> {
        match spec.trim().split_once('/') {
            Some((port, proto)) => Some((parse_port(port)?, Protocol::parse(proto)?)),
            None => Some((parse_port(spec)?, Protocol::Tcp)),
        }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ip) = &self.host_ip {
            write!(f, "{ip}:")?;
        }
        if let Some(host) = self.host {
            write!(f, "{host}:")?;
        }
        write!(f, "{}", self.container)?;
        if self.protocol == Protocol::Udp {
            f.write_str("/udp")?;
        }
        Ok(())
    }
}

fn parse_port(raw: &str) -> Option<u16> {
    raw.trim().parse::<u16>().ok().filter(|p| *p != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── PortMapping ──

    #[test]
    fn parses_host_and_container() {
        let p = PortMapping::parse("3001:3000").unwrap();
        assert_eq!(p.host, Some(3001));
        assert_eq!(p.container, 3000);
        assert_eq!(p.protocol, Protocol::Tcp);
        assert!(p.host_ip.is_none());
    }

    #[test]
    fn parses_protocol_suffix() {
        let p = PortMapping::parse("53:53/udp").unwrap();
        assert_eq!(p.protocol, Protocol::Udp);
        assert_eq!(p.container_spec(), "53/udp");
    }

    #[test]
    fn parses_host_ip() {
        let p = PortMapping::parse("127.0.0.1:8080:80").unwrap();
        assert_eq!(p.host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(p.host, Some(8080));
        assert_eq!(p.container, 80);
    }

    #[test]
    fn container_only_has_no_host_port() {
        let p = PortMapping::parse("9000").unwrap();
        assert!(p.host.is_none());
        assert_eq!(p.container, 9000);
    }

    #[test]
    fn ranges_are_reported_separately() {
        assert!(matches!(
            PortMapping::parse("8000-8010:8000-8010"),
            Err(PortParseError::Range(_))
        ));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            PortMapping::parse("abc:80"),
            Err(PortParseError::Invalid { .. })
        ));
        assert!(matches!(
            PortMapping::parse("70000:80"),
            Err(PortParseError::Invalid { .. })
        ));
        assert!(matches!(
            PortMapping::parse("80:80/sctp"),
            Err(PortParseError::Invalid { .. })
        ));
        assert!(matches!(
            PortMapping::parse(""),
            Err(PortParseError::Invalid { .. })
        ));
    }

    #[test]
    fn parses_container_spec_keys() {
        assert_eq!(
            PortMapping::parse_container_spec("53/udp"),
            Some((53, Protocol::Udp))
        );
        assert_eq!(
            PortMapping::parse_container_spec("3000"),
            Some((3000, Protocol::Tcp))
        );
        assert_eq!(PortMapping::parse_container_spec("x"), None);
    }

    // ── ServiceDefinition ──

    #[test]
    fn missing_required_fields_reports_blank_values() {
        let def = ServiceDefinition {
            container_name: Some("  ".to_owned()),
            image: Some("nginx".to_owned()),
            ..Default::default()
        };
        assert_eq!(def.missing_required_fields(), vec!["container_name", "restart"]);
    }

    #[test]
    fn upsert_env_var_keeps_position() {
        let mut def = ServiceDefinition {
            environment: vec!["TZ=Etc/UTC".to_owned(), "PUID=1000".to_owned()],
            ..Default::default()
        };
        def.upsert_env_var("TZ", "Europe/Berlin");
        def.upsert_env_var("PGID", "1000");

        assert_eq!(
            def.environment,
            vec!["TZ=Europe/Berlin", "PUID=1000", "PGID=1000"]
        );
        assert_eq!(def.env_var("TZ"), Some("Europe/Berlin"));
        assert_eq!(def.env_var("MISSING"), None);
    }

    #[test]
    fn bind_mount_sources_skip_named_volumes() {
        let def = ServiceDefinition {
            volumes: vec![
                "./volumes/app/data:/data".to_owned(),
                "named:/cache".to_owned(),
                "/etc/localtime:/etc/localtime:ro".to_owned(),
            ],
            ..Default::default()
        };
        assert_eq!(
            def.bind_mount_sources(),
            vec!["./volumes/app/data", "/etc/localtime"]
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_mapping() -> impl Strategy<Value = PortMapping> {
            (
                proptest::option::of((0u8..=255, 0u8..=255, 0u8..=255, 0u8..=255)),
                proptest::option::of(1u16..=65535),
                1u16..=65535,
                prop_oneof![Just(Protocol::Tcp), Just(Protocol::Udp)],
            )
                .prop_filter("bind address needs a host port", |(ip, host, _, _)| {
                    ip.is_none() || host.is_some()
                })
                .prop_map(|(ip, host, container, protocol)| PortMapping {
                    host_ip: ip.map(|(a, b, c, d)| format!("{a}.{b}.{c}.{d}")),
                    host,
                    container,
                    protocol,
                })
        }

        proptest! {
            #[test]
            fn display_parses_back(mapping in arb_mapping()) {
                let rendered = mapping.to_string();
                prop_assert_eq!(PortMapping::parse(&rendered).unwrap(), mapping);
            }

            #[test]
            fn explicit_tcp_suffix_is_the_default(host in 1u16..=65535, container in 1u16..=65535) {
                let with_suffix = PortMapping::parse(&format!("{host}:{container}/tcp")).unwrap();
                let without = PortMapping::parse(&format!("{host}:{container}")).unwrap();
                prop_assert_eq!(with_suffix, without);
            }

            #[test]
            fn parse_never_panics(entry in "[0-9a-z:./-]{0,24}") {
                let _ = PortMapping::parse(&entry);
            }
        }
    }
}
