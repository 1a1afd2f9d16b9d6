use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// stackgen.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackConfig {
    #[serde(default)]
    pub stack: StackSection,
    #[serde(default)]
    pub engine: EngineSection,
    /// Top-level compose networks. When empty, every network referenced
    /// by a compiled service is declared with the `bridge` driver.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackSection {
    /// Stack name, used as the compose project name
    #[serde(default = "default_stack_name")]
    pub name: String,
    /// Directory holding `<service>/service.yml` templates.
    /// Built-in templates are used for services not found here.
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,
    /// Staging directory the generated artifact is written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Build options file (TOML or JSON)
    #[serde(default = "default_options_file")]
    pub options_file: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Abort the whole build on the first service failure
    #[serde(default)]
    pub fail_fast: bool,
    /// Upper bound for every plugin call, in seconds
    #[serde(default = "default_service_timeout_secs")]
    pub service_timeout_secs: u64,
    /// Also package the artifact as `build.zip`
    #[serde(default = "default_archive")]
    pub archive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_network_driver")]
    pub driver: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub external: bool,
}

impl Default for StackSection {
    fn default() -> Self {
        Self {
            name: default_stack_name(),
            templates_dir: None,
            output_dir: default_output_dir(),
            options_file: default_options_file(),
        }
    }
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            fail_fast: false,
            service_timeout_secs: default_service_timeout_secs(),
            archive: default_archive(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            driver: default_network_driver(),
            external: false,
        }
    }
}

impl StackConfig {
    /// Load from stackgen.toml in the given directory, or return defaults if not found.
    pub fn load(project_dir: &Path) -> crate::Result<Self> {
        let config_path = project_dir.join("stackgen.toml");
        if config_path.exists() {
            let content =
                std::fs::read_to_string(&config_path).map_err(|e| crate::Error::ConfigLoad {
                    path: config_path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| crate::Error::ConfigParse {
                path: config_path,
                source: e,
            })
        } else {
            Ok(Self::default())
        }
    }

    /// Templates directory resolved against the project directory.
    pub fn templates_dir(&self, project_dir: &Path) -> Option<PathBuf> {
        self.stack
            .templates_dir
            .as_ref()
            .map(|dir| project_dir.join(dir))
    }
}

fn default_stack_name() -> String {
    "stack".to_owned()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_options_file() -> PathBuf {
    PathBuf::from("build-options.toml")
}

fn default_service_timeout_secs() -> u64 {
    30
}

fn default_archive() -> bool {
    true
}

fn default_network_driver() -> String {
    "bridge".to_owned()
}
