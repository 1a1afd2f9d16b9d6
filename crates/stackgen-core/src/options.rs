use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The user's stack selection and per-service settings for one build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Services to build, in processing order.
    #[serde(default)]
    pub selected_services: Vec<String>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceOptions>,
}

/// Desired configuration for one service. Every field is optional; an
/// absent field leaves the template value alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOptions {
    /// Replaces the tag of the template image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    /// Container port spec (`3000`, `53/udp`) to host port.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ports: BTreeMap<String, u16>,
    /// `Some(true)` enables bounded json-file logging, `Some(false)` removes logging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<bool>,
    /// Empty string clears the template network mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub networks: Option<Vec<String>>,
    /// Container path to host path.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environment: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices: Option<Vec<String>>,
}

impl BuildOptions {
    /// Options selecting the given services with no overrides.
    pub fn select<I, S>(services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selected_services: services.into_iter().map(Into::into).collect(),
            services: BTreeMap::new(),
        }
    }

    /// Load from a `.json` file, or TOML for any other extension.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| crate::Error::OptionsRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let options: Self = if is_json {
            serde_json::from_str(&content).map_err(|e| crate::Error::OptionsParseJson {
                path: path.to_path_buf(),
                source: e,
            })?
        } else {
            toml::from_str(&content).map_err(|e| crate::Error::OptionsParseToml {
                path: path.to_path_buf(),
                source: e,
            })?
        };

        for name in &options.selected_services {
            validate_service_name(name)?;
        }
        Ok(options)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceOptions> {
        self.services.get(name)
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected_services.iter().any(|s| s == name)
    }

    /// Selected services other than `name`, in processing order.
    pub fn peers<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.selected_services
            .iter()
            .map(String::as_str)
            .filter(move |s| *s != name)
    }
}

/// Service names become directory names and shell path segments.
pub fn validate_service_name(name: &str) -> crate::Result<()> {
    let invalid = |reason| crate::Error::InvalidServiceName {
        name: name.to_owned(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("must not be empty"));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err(invalid("must not start with '.' or '-'"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(invalid("only ASCII letters, digits, '-', '_' and '.' are allowed"));
    }
    Ok(())
}
