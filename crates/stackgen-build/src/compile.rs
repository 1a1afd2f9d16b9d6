//! Compile mutators: build options applied to a service template.
//!
//! Each mutator takes the current definition and returns a new snapshot.
//! Inputs are never modified. `revision` is bumped only when the snapshot
//! differs from its input, so applying a mutator to its own output is a
//! no-op.

use serde::Serialize;
use stackgen_core::{BuildOptions, LoggingConfig, PortMapping, ServiceDefinition, ServiceOptions};

pub const DEFAULT_LOG_DRIVER: &str = "json-file";
pub const DEFAULT_LOG_MAX_SIZE: &str = "5m";
pub const DEFAULT_LOG_MAX_FILE: &str = "3";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Change {
    Unchanged,
    Modified { detail: String },
}

impl Change {
    pub fn is_modified(&self) -> bool {
        matches!(self, Self::Modified { .. })
    }
}

/// Result of one mutator.
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    pub definition: ServiceDefinition,
    pub change: Change,
}

impl Mutation {
    fn unchanged(template: &ServiceDefinition) -> Self {
        Self {
            definition: template.clone(),
            change: Change::Unchanged,
        }
    }

    fn evaluate(before: &ServiceDefinition, mut after: ServiceDefinition, detail: String) -> Self {
        if *before == after {
            return Self {
                definition: after,
                change: Change::Unchanged,
            };
        }
        after.revision = before.revision + 1;
        Self {
            definition: after,
            change: Change::Modified { detail },
        }
    }
}

/// What each mutator did during one compile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileReport {
    pub image_tag: Change,
    pub ports: Change,
    pub logging: Change,
    pub network_mode: Change,
    pub networks: Change,
    pub volumes: Change,
    pub environment: Change,
    pub devices: Change,
}

impl CompileReport {
    pub fn modified_count(&self) -> usize {
        [
            &self.image_tag,
            &self.ports,
            &self.logging,
            &self.network_mode,
            &self.networks,
            &self.volumes,
            &self.environment,
            &self.devices,
        ]
        .into_iter()
        .filter(|c| c.is_modified())
        .count()
    }
}

/// The eight compile mutators. Each default method runs the shared logic.
pub trait Mutators: Send + Sync {
    fn set_image_tag(&self, template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
        set_image_tag(template, options, service_name)
    }

    fn set_modified_ports(&self, template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
        set_modified_ports(template, options, service_name)
    }

    fn set_logging_state(&self, template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
        set_logging_state(template, options, service_name)
    }

    fn set_network_mode(&self, template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
        set_network_mode(template, options, service_name)
    }

    fn set_networks(&self, template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
        set_networks(template, options, service_name)
    }

    fn set_volumes(&self, template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
        set_volumes(template, options, service_name)
    }

    fn set_environment_variables(
        &self,
        template: &ServiceDefinition,
        options: &BuildOptions,
        service_name: &str,
    ) -> Mutation {
        set_environment_variables(template, options, service_name)
    }

    fn set_devices(&self, template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
        set_devices(template, options, service_name)
    }
}

/// Mutators shared by every built-in service.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonCompileLogic;

impl Mutators for CommonCompileLogic {}

/// Run all eight mutators in order, threading each output into the next.
pub fn compile_with<M: Mutators + ?Sized>(
    mutators: &M,
    template: &ServiceDefinition,
    options: &BuildOptions,
    service_name: &str,
) -> (ServiceDefinition, CompileReport) {
    let image_tag = mutators.set_image_tag(template, options, service_name);
    let ports = mutators.set_modified_ports(&image_tag.definition, options, service_name);
    let logging = mutators.set_logging_state(&ports.definition, options, service_name);
    let network_mode = mutators.set_network_mode(&logging.definition, options, service_name);
    let networks = mutators.set_networks(&network_mode.definition, options, service_name);
    let volumes = mutators.set_volumes(&networks.definition, options, service_name);
    let environment = mutators.set_environment_variables(&volumes.definition, options, service_name);
    let devices = mutators.set_devices(&environment.definition, options, service_name);

    let definition = devices.definition;
    let report = CompileReport {
        image_tag: image_tag.change,
        ports: ports.change,
        logging: logging.change,
        network_mode: network_mode.change,
        networks: networks.change,
        volumes: volumes.change,
        environment: environment.change,
        devices: devices.change,
    };
    (definition, report)
}

fn service_options<'a>(options: &'a BuildOptions, service_name: &str) -> Option<&'a ServiceOptions> {
    options.service(service_name)
}

// ── Mutators ──

pub fn set_image_tag(template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
    let tag = service_options(options, service_name)
        .and_then(|o| o.image_tag.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let (Some(tag), Some(image)) = (tag, template.image.as_deref()) else {
        return Mutation::unchanged(template);
    };

    let updated = format!("{}:{tag}", image_repository(image));
    let mut next = template.clone();
    next.image = Some(updated.clone());
    Mutation::evaluate(template, next, format!("image set to {updated}"))
}

/// `registry:5000/org/app:1.2@sha256:…` → `registry:5000/org/app`
fn image_repository(image: &str) -> &str {
    let image = image.split('@').next().unwrap_or(image);
    let name_start = image.rfind('/').map_or(0, |i| i + 1);
    match image[name_start..].rfind(':') {
        Some(i) => &image[..name_start + i],
        None => image,
    }
}

/// Rewrite the host side of ports whose container spec has an override.
///
/// Only entries that actually change are re-rendered; unparseable entries
/// are left for the port checker to report.
pub fn set_modified_ports(template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
    let Some(overrides) = service_options(options, service_name)
        .map(|o| &o.ports)
        .filter(|p| !p.is_empty())
    else {
        return Mutation::unchanged(template);
    };

    let requested: Vec<((u16, stackgen_core::Protocol), u16)> = overrides
        .iter()
        .filter_map(|(spec, host)| PortMapping::parse_container_spec(spec).map(|key| (key, *host)))
        .collect();

    let mut next = template.clone();
    let mut changed = Vec::new();
    for entry in &mut next.ports {
        let Ok(mut mapping) = PortMapping::parse(entry) else {
            continue;
        };
        let Some(host) = requested
            .iter()
            .find(|(key, _)| *key == (mapping.container, mapping.protocol))
            .map(|(_, host)| *host)
        else {
            continue;
        };
        if mapping.host == Some(host) {
            continue;
        }
        mapping.host = Some(host);
        changed.push(format!("{} -> {host}", mapping.container_spec()));
        *entry = mapping.to_string();
    }

    Mutation::evaluate(template, next, changed.join(", "))
}

pub fn set_logging_state(template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
    let Some(enabled) = service_options(options, service_name).and_then(|o| o.logging) else {
        return Mutation::unchanged(template);
    };

    let mut next = template.clone();
    let detail = if enabled {
        if next.logging.is_none() {
            next.logging = Some(default_logging());
        }
        "logging enabled"
    } else {
        next.logging = None;
        "logging disabled"
    };
    Mutation::evaluate(template, next, detail.to_owned())
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        driver: DEFAULT_LOG_DRIVER.to_owned(),
        options: [
            ("max-size".to_owned(), DEFAULT_LOG_MAX_SIZE.to_owned()),
            ("max-file".to_owned(), DEFAULT_LOG_MAX_FILE.to_owned()),
        ]
        .into(),
    }
}

/// An empty `network_mode` option clears the template's mode.
pub fn set_network_mode(template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
    let Some(mode) = service_options(options, service_name).and_then(|o| o.network_mode.as_deref()) else {
        return Mutation::unchanged(template);
    };

    let mode = mode.trim();
    let mut next = template.clone();
    let detail = if mode.is_empty() {
        next.network_mode = None;
        "network_mode cleared".to_owned()
    } else {
        next.network_mode = Some(mode.to_owned());
        format!("network_mode set to {mode}")
    };
    Mutation::evaluate(template, next, detail)
}

pub fn set_networks(template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
    let Some(networks) = service_options(options, service_name).and_then(|o| o.networks.as_ref()) else {
        return Mutation::unchanged(template);
    };

    let mut next = template.clone();
    next.networks = dedup_preserving_order(networks);
    let detail = format!("networks set to [{}]", next.networks.join(", "));
    Mutation::evaluate(template, next, detail)
}

/// Replace the host side of mounts keyed by their container path.
pub fn set_volumes(template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
    let Some(overrides) = service_options(options, service_name)
        .map(|o| &o.volumes)
        .filter(|v| !v.is_empty())
    else {
        return Mutation::unchanged(template);
    };

    let mut next = template.clone();
    let mut changed = Vec::new();
    for entry in &mut next.volumes {
        let Some((host, rest)) = entry.split_once(':') else {
            continue;
        };
        let container = rest.split(':').next().unwrap_or(rest);
        let Some(new_host) = overrides.get(container) else {
            continue;
        };
        if host == new_host {
            continue;
        }
        changed.push(format!("{container} -> {new_host}"));
        *entry = format!("{new_host}:{rest}");
    }

    Mutation::evaluate(template, next, changed.join(", "))
}

pub fn set_environment_variables(
    template: &ServiceDefinition,
    options: &BuildOptions,
    service_name: &str,
) -> Mutation {
    let Some(vars) = service_options(options, service_name)
        .map(|o| &o.environment)
        .filter(|e| !e.is_empty())
    else {
        return Mutation::unchanged(template);
    };

    let mut next = template.clone();
    for (key, value) in vars {
        next.upsert_env_var(key, value);
    }
    let keys: Vec<&str> = vars.keys().map(String::as_str).collect();
    Mutation::evaluate(template, next, format!("environment set: {}", keys.join(", ")))
}

pub fn set_devices(template: &ServiceDefinition, options: &BuildOptions, service_name: &str) -> Mutation {
    let Some(devices) = service_options(options, service_name).and_then(|o| o.devices.as_ref()) else {
        return Mutation::unchanged(template);
    };

    let mut next = template.clone();
    next.devices = dedup_preserving_order(devices);
    let detail = format!("devices set to [{}]", next.devices.join(", "));
    Mutation::evaluate(template, next, detail)
}

fn dedup_preserving_order(items: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn adguard() -> ServiceDefinition {
        ServiceDefinition {
            container_name: Some("adguardhome".into()),
            image: Some("adguard/adguardhome:latest".into()),
            restart: Some("unless-stopped".into()),
            ports: vec![
                "53:53/tcp".into(),
                "53:53/udp".into(),
                "3001:3000/tcp".into(),
            ],
            volumes: vec![
                "./volumes/adguardhome/workdir:/opt/adguardhome/work".into(),
                "./volumes/adguardhome/confdir:/opt/adguardhome/conf".into(),
            ],
            networks: vec!["iotstack_nw".into()],
            ..Default::default()
        }
    }

    fn options_for(service: &str, opts: ServiceOptions) -> BuildOptions {
        let mut options = BuildOptions::select([service]);
        options.services.insert(service.to_owned(), opts);
        options
    }

    #[test]
    fn no_options_leaves_everything_unchanged() {
        let template = adguard();
        let options = BuildOptions::select(["adguardhome"]);

        let (def, report) = compile_with(&CommonCompileLogic, &template, &options, "adguardhome");

        assert_eq!(def, template);
        assert_eq!(report.modified_count(), 0);
    }

    #[test]
    fn image_tag_replaces_existing_tag() {
        let options = options_for(
            "adguardhome",
            ServiceOptions {
                image_tag: Some("v0.107.0".into()),
                ..Default::default()
            },
        );
        let m = set_image_tag(&adguard(), &options, "adguardhome");
        assert_eq!(m.definition.image.as_deref(), Some("adguard/adguardhome:v0.107.0"));
        assert_eq!(m.definition.revision, 1);
        assert!(m.change.is_modified());
    }

    #[test]
    fn image_repository_handles_registry_ports_and_digests() {
        assert_eq!(image_repository("nginx"), "nginx");
        assert_eq!(image_repository("nginx:1.25"), "nginx");
        assert_eq!(image_repository("registry:5000/org/app"), "registry:5000/org/app");
        assert_eq!(image_repository("registry:5000/org/app:2"), "registry:5000/org/app");
        assert_eq!(image_repository("app@sha256:abc"), "app");
    }

    #[test]
    fn modified_ports_rewrite_only_matching_protocol() {
        let options = options_for(
            "adguardhome",
            ServiceOptions {
                ports: BTreeMap::from([("53/udp".to_owned(), 5353), ("3000/tcp".to_owned(), 3002)]),
                ..Default::default()
            },
        );
        let m = set_modified_ports(&adguard(), &options, "adguardhome");

        assert_eq!(m.definition.ports, vec!["53:53/tcp", "5353:53/udp", "3002:3000"]);
        assert_eq!(m.definition.revision, 1);
    }

    #[test]
    fn logging_enable_and_disable() {
        let on = options_for(
            "adguardhome",
            ServiceOptions {
                logging: Some(true),
                ..Default::default()
            },
        );
        let enabled = set_logging_state(&adguard(), &on, "adguardhome").definition;
        let logging = enabled.logging.as_ref().unwrap();
        assert_eq!(logging.driver, DEFAULT_LOG_DRIVER);
        assert_eq!(logging.options["max-size"], DEFAULT_LOG_MAX_SIZE);

        let off = options_for(
            "adguardhome",
            ServiceOptions {
                logging: Some(false),
                ..Default::default()
            },
        );
        let disabled = set_logging_state(&enabled, &off, "adguardhome").definition;
        assert!(disabled.logging.is_none());
        assert_eq!(disabled.revision, 2);
    }

    #[test]
    fn empty_network_mode_clears() {
        let mut template = adguard();
        template.network_mode = Some("host".into());
        let options = options_for(
            "adguardhome",
            ServiceOptions {
                network_mode: Some(String::new()),
                ..Default::default()
            },
        );

        let m = set_network_mode(&template, &options, "adguardhome");
        assert!(m.definition.network_mode.is_none());
        assert_eq!(
            m.change,
            Change::Modified {
                detail: "network_mode cleared".into()
            }
        );
    }

    #[test]
    fn networks_are_deduplicated() {
        let options = options_for(
            "adguardhome",
            ServiceOptions {
                networks: Some(vec!["a".into(), "b".into(), "a".into()]),
                ..Default::default()
            },
        );
        let m = set_networks(&adguard(), &options, "adguardhome");
        assert_eq!(m.definition.networks, vec!["a", "b"]);
    }

    #[test]
    fn volumes_keyed_by_container_path() {
        let options = options_for(
            "adguardhome",
            ServiceOptions {
                volumes: BTreeMap::from([("/opt/adguardhome/conf".to_owned(), "/srv/adguard/conf".to_owned())]),
                ..Default::default()
            },
        );
        let m = set_volumes(&adguard(), &options, "adguardhome");
        assert_eq!(
            m.definition.volumes,
            vec![
                "./volumes/adguardhome/workdir:/opt/adguardhome/work",
                "/srv/adguard/conf:/opt/adguardhome/conf",
            ]
        );
    }

    #[test]
    fn environment_upserts_in_place() {
        let mut template = adguard();
        template.environment = vec!["TZ=Etc/UTC".into(), "A=1".into()];
        let options = options_for(
            "adguardhome",
            ServiceOptions {
                environment: BTreeMap::from([("TZ".to_owned(), "Europe/Berlin".to_owned()), ("B".to_owned(), "2".to_owned())]),
                ..Default::default()
            },
        );
        let m = set_environment_variables(&template, &options, "adguardhome");
        assert_eq!(m.definition.environment, vec!["TZ=Europe/Berlin", "A=1", "B=2"]);
    }

    #[test]
    fn template_is_never_mutated() {
        let template = adguard();
        let snapshot = template.clone();
        let options = options_for(
            "adguardhome",
            ServiceOptions {
                image_tag: Some("edge".into()),
                devices: Some(vec!["/dev/ttyUSB0".into()]),
                ..Default::default()
            },
        );

        let (def, report) = compile_with(&CommonCompileLogic, &template, &options, "adguardhome");

        assert_eq!(template, snapshot);
        assert_eq!(def.revision, 2);
        assert_eq!(report.modified_count(), 2);
        assert_eq!(def.devices, vec!["/dev/ttyUSB0"]);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn arb_service_options() -> impl Strategy<Value = ServiceOptions> {
            (
                proptest::option::of("[a-z0-9.]{1,8}"),
                proptest::collection::btree_map(
                    prop_oneof![Just("53/tcp".to_owned()), Just("53/udp".to_owned()), Just("3000/tcp".to_owned())],
                    1u16..=65535,
                    0..3,
                ),
                proptest::option::of(any::<bool>()),
                proptest::option::of(prop_oneof![Just(String::new()), Just("host".to_owned())]),
                proptest::option::of(proptest::collection::vec("[a-z]{1,5}", 0..4)),
                proptest::collection::btree_map("[A-Z]{1,4}", "[a-z0-9]{0,6}", 0..3),
                proptest::option::of(proptest::collection::vec("/dev/[a-z]{1,5}", 0..3)),
            )
                .prop_map(|(image_tag, ports, logging, network_mode, networks, environment, devices)| ServiceOptions {
                    image_tag,
                    ports,
                    logging,
                    network_mode,
                    networks,
                    volumes: BTreeMap::new(),
                    environment,
                    devices,
                })
        }

        proptest! {
            #[test]
            fn compile_is_idempotent(opts in arb_service_options()) {
                let options = options_for("adguardhome", opts);
                let (first, _) = compile_with(&CommonCompileLogic, &adguard(), &options, "adguardhome");
                let (second, report) = compile_with(&CommonCompileLogic, &first, &options, "adguardhome");

                prop_assert_eq!(&second, &first);
                prop_assert_eq!(report.modified_count(), 0);
            }

            #[test]
            fn revision_counts_modified_mutators(opts in arb_service_options()) {
                let options = options_for("adguardhome", opts);
                let (def, report) = compile_with(&CommonCompileLogic, &adguard(), &options, "adguardhome");

                prop_assert_eq!(def.revision, report.modified_count() as u64);
            }
        }
    }
}
