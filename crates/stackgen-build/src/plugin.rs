use std::any::Any;
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackgen_core::{BuildOptions, Issue, ScriptFragment, ServiceDefinition, ZipEntry};

use crate::compile::CompileReport;

/// The lifecycle every service builder implements.
///
/// The engine holds plugins as `Arc<dyn ServicePlugin>`, calls them in a
/// fixed order per service and never hands one plugin another service's
/// definition.
#[async_trait]
pub trait ServicePlugin: Send + Sync {
    /// Service this plugin owns.
    fn service_name(&self) -> &str;

    /// Name used in structured error components.
    fn plugin_name(&self) -> &str {
        "ServiceBuilder"
    }

    async fn init(&self) -> Result<(), PluginError>;

    /// Apply build options to a template. The template is left untouched.
    async fn compile(
        &self,
        template: &ServiceDefinition,
        options: &BuildOptions,
    ) -> Result<CompileOutput, PluginError>;

    /// Report conflicts in compiled output. Must not change any state.
    async fn issues(
        &self,
        definition: &ServiceDefinition,
        options: &BuildOptions,
        tmp_path: &Path,
    ) -> Result<Vec<Issue>, PluginError>;

    /// Fill unset required fields. `None` means the service has no defaults.
    async fn assume(
        &self,
        _definition: &ServiceDefinition,
        _options: &BuildOptions,
    ) -> Result<Option<ServiceDefinition>, PluginError> {
        Ok(None)
    }

    /// Queue script fragments and artifact files into `sink`.
    async fn build(
        &self,
        definition: &ServiceDefinition,
        options: &BuildOptions,
        tmp_path: &Path,
        sink: &mut BuildSink,
    ) -> Result<Outcome, PluginError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outcome {
    Service,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileOutput {
    pub outcome: Outcome,
    pub definition: ServiceDefinition,
    pub report: CompileReport,
}

/// Everything one `build()` call contributes to the artifact.
///
/// Each call gets its own sink; the engine appends it to the shared
/// sequences only after the call succeeded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildSink {
    pub prebuild_scripts: Vec<ScriptFragment>,
    pub postbuild_scripts: Vec<ScriptFragment>,
    pub zip_list: Vec<ZipEntry>,
}

impl BuildSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.prebuild_scripts.is_empty()
            && self.postbuild_scripts.is_empty()
            && self.zip_list.is_empty()
    }

    pub fn append(&mut self, other: BuildSink) {
        self.prebuild_scripts.extend(other.prebuild_scripts);
        self.postbuild_scripts.extend(other.postbuild_scripts);
        self.zip_list.extend(other.zip_list);
    }
}

// ── Structured error ──

/// Source chains deeper than this are cut off.
const MAX_SOURCE_DEPTH: usize = 32;

/// Failure of a plugin call.
///
/// `component` reads `"<PluginName>::<method>() - '<service>'"`; `error`
/// holds the original failure's display text, debug form and source chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{component}: {message}")]
pub struct PluginError {
    pub component: String,
    pub message: String,
    pub error: serde_json::Value,
}

impl PluginError {
    pub const UNHANDLED: &'static str = "Unhandled error occurred";

    pub fn component_name(plugin: &str, method: &str, service: &str) -> String {
        format!("{plugin}::{method}() - '{service}'")
    }

    pub fn new(
        component: impl Into<String>,
        message: impl Into<String>,
        error: serde_json::Value,
    ) -> Self {
        Self {
            component: component.into(),
            message: message.into(),
            error,
        }
    }

    /// Wrap an unexpected failure.
    pub fn unhandled(
        component: impl Into<String>,
        err: &(dyn std::error::Error + 'static),
    ) -> Self {
        Self::new(component, Self::UNHANDLED, serialize_error(err))
    }

    /// Wrap a panic payload caught around a plugin call.
    pub fn from_panic(component: impl Into<String>, payload: &(dyn Any + Send)) -> Self {
        let detail = panic_message(payload);
        Self::new(
            component,
            "Plugin panicked",
            serde_json::json!({ "message": detail, "panic": true }),
        )
    }
}

/// Capture display text, debug form and the full `source()` chain.
pub fn serialize_error(err: &(dyn std::error::Error + 'static)) -> serde_json::Value {
    let mut sources = Vec::new();
    let mut current = err.source();
    while let Some(source) = current {
        if sources.len() == MAX_SOURCE_DEPTH {
            sources.push("…source chain truncated".to_owned());
            break;
        }
        sources.push(source.to_string());
        current = source.source();
    }

    serde_json::json!({
        "message": err.to_string(),
        "debug": format!("{err:?}"),
        "sources": sources,
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic payload is not a string".to_owned()
    }
}
