//! Base service templates.
//!
//! A template is a `service.yml` holding one compose service definition.
//! Templates are immutable: every build starts from a fresh copy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::options::validate_service_name;
use crate::service::ServiceDefinition;

/// Supplies the base definition for a service name.
pub trait TemplateStore: Send + Sync {
    fn load(&self, service_name: &str) -> Result<ServiceDefinition, TemplateError>;

    /// Service names this store can load, sorted.
    fn available(&self) -> Vec<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("no template found for service '{0}'")]
    NotFound(String),

    #[error("failed to read template {path}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse template for service '{service}'")]
    Parse {
        service: String,
        source: serde_yaml::Error,
    },
}

// ── Directory store ──

/// Reads `<root>/<service>/service.yml`.
#[derive(Debug, Clone)]
pub struct DirTemplateStore {
    root: PathBuf,
}

impl DirTemplateStore {
    pub const TEMPLATE_FILE: &'static str = "service.yml";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn template_path(&self, service_name: &str) -> PathBuf {
        self.root.join(service_name).join(Self::TEMPLATE_FILE)
    }
}

impl TemplateStore for DirTemplateStore {
    fn load(&self, service_name: &str) -> Result<ServiceDefinition, TemplateError> {
        if validate_service_name(service_name).is_err() {
            return Err(TemplateError::NotFound(service_name.to_owned()));
        }

        let path = self.template_path(service_name);
        if !path.is_file() {
            return Err(TemplateError::NotFound(service_name.to_owned()));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| TemplateError::Read {
            path: path.clone(),
            source: e,
        })?;
        tracing::debug!(service = service_name, path = %path.display(), "loaded template");

        ServiceDefinition::from_yaml(&content).map_err(|e| TemplateError::Parse {
            service: service_name.to_owned(),
            source: e,
        })
    }

    fn available(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(Self::TEMPLATE_FILE).is_file())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        names
    }
}

// ── In-memory store ──

/// Templates held as YAML text, parsed on every load.
#[derive(Debug, Clone, Default)]
pub struct MemoryTemplateStore {
    templates: BTreeMap<String, String>,
}

impl MemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_template(mut self, service_name: &str, yaml: &str) -> Self {
        self.insert(service_name, yaml);
        self
    }

    pub fn insert(&mut self, service_name: &str, yaml: &str) {
        self.templates
            .insert(service_name.to_owned(), yaml.to_owned());
    }
}

impl TemplateStore for MemoryTemplateStore {
    fn load(&self, service_name: &str) -> Result<ServiceDefinition, TemplateError> {
        let yaml = self
            .templates
            .get(service_name)
            .ok_or_else(|| TemplateError::NotFound(service_name.to_owned()))?;

        ServiceDefinition::from_yaml(yaml).map_err(|e| TemplateError::Parse {
            service: service_name.to_owned(),
            source: e,
        })
    }

    fn available(&self) -> Vec<String> {
        self.templates.keys().cloned().collect()
    }
}

// ── Built-in templates ──

const BUILTIN: &[(&str, &str)] = &[
    (
        "adguardhome",
        include_str!("../templates/adguardhome/service.yml"),
    ),
    (
        "mosquitto",
        include_str!("../templates/mosquitto/service.yml"),
    ),
    ("pihole", include_str!("../templates/pihole/service.yml")),
];

/// Templates shipped with stackgen.
#[derive(Debug, Clone)]
pub struct BuiltinTemplates {
    inner: MemoryTemplateStore,
}

impl BuiltinTemplates {
    pub fn new() -> Self {
        let inner = BUILTIN
            .iter()
            .fold(MemoryTemplateStore::new(), |store, (name, yaml)| {
                store.with_template(name, yaml)
            });
        Self { inner }
    }
}

impl Default for BuiltinTemplates {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateStore for BuiltinTemplates {
    fn load(&self, service_name: &str) -> Result<ServiceDefinition, TemplateError> {
        self.inner.load(service_name)
    }

    fn available(&self) -> Vec<String> {
        self.inner.available()
    }
}

// ── Chained store ──

/// Tries each store in order; the first one that has the service wins.
#[derive(Default)]
pub struct ChainedTemplateStore {
    stores: Vec<Box<dyn TemplateStore>>,
}

impl ChainedTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, store: impl TemplateStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }
}

impl TemplateStore for ChainedTemplateStore {
    fn load(&self, service_name: &str) -> Result<ServiceDefinition, TemplateError> {
        for store in &self.stores {
            match store.load(service_name) {
                Err(TemplateError::NotFound(_)) => continue,
                other => return other,
            }
        }
        Err(TemplateError::NotFound(service_name.to_owned()))
    }

    fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = self.stores.iter().flat_map(|s| s.available()).collect();
        names.sort();
        names.dedup();
        names
    }
}
