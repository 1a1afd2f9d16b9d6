use std::collections::BTreeMap;
use std::sync::Arc;

use stackgen_core::ServiceDefinition;

use crate::plugin::ServicePlugin;
use crate::standard::{ServiceBlueprint, ServiceDefaults, StandardServicePlugin};

const MOSQUITTO_CONF: &str = "\
listener 1883
allow_anonymous true
persistence true
persistence_location /mosquitto/data/
log_dest file /mosquitto/log/mosquitto.log
";

/// Blueprints for the services stackgen ships with.
pub fn builtin_blueprints() -> Vec<ServiceBlueprint> {
    vec![
        ServiceBlueprint::new("adguardhome", "AdGuard Home").with_volume_dirs(["workdir", "confdir"]),
        ServiceBlueprint::new("mosquitto", "Mosquitto")
            .with_volume_dirs(["config", "data", "log"])
            .with_generated_file("config/mosquitto.conf", MOSQUITTO_CONF),
        ServiceBlueprint::new("pihole", "Pi-hole")
            .with_volume_dirs(["etc-pihole", "etc-dnsmasq.d"])
            .with_defaults(ServiceDefaults {
                image: Some("pihole/pihole:latest".to_owned()),
                restart: "unless-stopped".to_owned(),
                environment: vec![("TZ".to_owned(), "Etc/UTC".to_owned())],
            }),
    ]
}

/// Plugins by service name.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Arc<dyn ServicePlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtin() -> Self {
        builtin_blueprints()
            .into_iter()
            .fold(Self::new(), |registry, blueprint| {
                registry.with(Arc::new(StandardServicePlugin::new(blueprint)))
            })
    }

    /// Add or replace the plugin for its service.
    pub fn register(&mut self, plugin: Arc<dyn ServicePlugin>) {
        self.plugins.insert(plugin.service_name().to_owned(), plugin);
    }

    pub fn with(mut self, plugin: Arc<dyn ServicePlugin>) -> Self {
        self.register(plugin);
        self
    }

    pub fn get(&self, service_name: &str) -> Option<Arc<dyn ServicePlugin>> {
        self.plugins.get(service_name).cloned()
    }

    /// Registered plugin, or a standard one inferred from the template.
    pub fn resolve(&self, service_name: &str, template: &ServiceDefinition) -> Arc<dyn ServicePlugin> {
        match self.get(service_name) {
            Some(plugin) => plugin,
            None => {
                tracing::debug!(service = service_name, "No registered plugin, inferring from template");
                Arc::new(StandardServicePlugin::new(ServiceBlueprint::infer(service_name, template)))
            }
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry").field("plugins", &self.names()).finish()
    }
}
