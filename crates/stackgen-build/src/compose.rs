use std::collections::BTreeMap;

use serde::Serialize;
use stackgen_core::{NetworkConfig, ServiceDefinition};

/// Renders the stack's `docker-compose.yml`.
///
/// Services are written in the order given. Networks referenced by a
/// service but missing from the stack config get a default bridge entry.
pub struct ComposeGenerator<'a> {
    stack_name: &'a str,
    services: &'a [(String, ServiceDefinition)],
    networks: &'a BTreeMap<String, NetworkConfig>,
}

#[derive(Serialize)]
struct ComposeFile<'a> {
    name: &'a str,
    services: serde_yaml::Mapping,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    networks: BTreeMap<String, NetworkConfig>,
}

impl<'a> ComposeGenerator<'a> {
    pub fn new(
        stack_name: &'a str,
        services: &'a [(String, ServiceDefinition)],
        networks: &'a BTreeMap<String, NetworkConfig>,
    ) -> Self {
        Self {
            stack_name,
            services,
            networks,
        }
    }

    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        let mut services = serde_yaml::Mapping::new();
        let mut networks = BTreeMap::new();

        for (name, definition) in self.services {
            services.insert(
                serde_yaml::Value::String(name.clone()),
                serde_yaml::to_value(definition)?,
            );
            for network in &definition.networks {
                let config = self.networks.get(network).cloned().unwrap_or_default();
                networks.insert(network.clone(), config);
            }
        }

        let file = ComposeFile {
            name: self.stack_name,
            services,
            networks,
        };
        serde_yaml::to_string(&file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(image: &str, networks: &[&str]) -> ServiceDefinition {
        ServiceDefinition {
            image: Some(image.to_owned()),
            networks: networks.iter().map(|n| (*n).to_owned()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn services_keep_processing_order() {
        let services = vec![
            ("zeta".to_owned(), service("z", &[])),
            ("alpha".to_owned(), service("a", &[])),
        ];
        let yaml = ComposeGenerator::new("home", &services, &BTreeMap::new())
            .render()
            .unwrap();

        let zeta = yaml.find("zeta:").unwrap();
        let alpha = yaml.find("alpha:").unwrap();
        assert!(zeta < alpha, "got:\n{yaml}");
        assert!(yaml.starts_with("name: home\n"));
        assert!(!yaml.contains("networks:"));
    }

    #[test]
    fn referenced_networks_are_declared() {
        let services = vec![("a".to_owned(), service("a", &["iotstack_nw", "proxy"]))];
        let configured = BTreeMap::from([(
            "proxy".to_owned(),
            NetworkConfig {
                driver: "overlay".to_owned(),
                external: true,
            },
        )]);

        let yaml = ComposeGenerator::new("home", &services, &configured)
            .render()
            .unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(doc["networks"]["iotstack_nw"]["driver"], "bridge");
        assert_eq!(doc["networks"]["proxy"]["driver"], "overlay");
        assert_eq!(doc["networks"]["proxy"]["external"], true);
        assert_eq!(doc["services"]["a"]["image"], "a");
    }
}
