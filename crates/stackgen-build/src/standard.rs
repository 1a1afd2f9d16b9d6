use std::path::Path;

use async_trait::async_trait;
use stackgen_core::{BuildOptions, Issue, ScriptFragment, ServiceDefinition, ZipEntry};

use crate::checks::{Checks, CommonBuildChecks};
use crate::compile::{self, CommonCompileLogic, Mutators};
use crate::plugin::{BuildSink, CompileOutput, Outcome, PluginError, ServicePlugin};
use crate::script;

/// Static description of a service: what it mounts and what it ships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBlueprint {
    pub name: String,
    /// Human name used in script messages.
    pub display_name: String,
    /// Directories under `./volumes/<name>/` that must exist before launch.
    pub volume_dirs: Vec<String>,
    pub generated_files: Vec<GeneratedFile>,
    /// Values `assume()` fills into unset required fields.
    pub defaults: Option<ServiceDefaults>,
}

/// A file written into the artifact at `volumes/<service>/<path>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: String,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefaults {
    pub image: Option<String>,
    pub restart: String,
    pub environment: Vec<(String, String)>,
}

impl ServiceBlueprint {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            volume_dirs: Vec::new(),
            generated_files: Vec::new(),
            defaults: None,
        }
    }

    pub fn with_volume_dirs<I, S>(mut self, dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.volume_dirs = dirs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_generated_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.generated_files.push(GeneratedFile {
            path: path.into(),
            contents: contents.into(),
        });
        self
    }

    pub fn with_defaults(mut self, defaults: ServiceDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Blueprint for a template with no built-in plugin: volume dirs are
    /// taken from its `./volumes/<name>/…` bind mounts.
    pub fn infer(name: &str, template: &ServiceDefinition) -> Self {
        let prefix = format!("./volumes/{name}/");
        let mut dirs: Vec<String> = Vec::new();
        for source in template.bind_mount_sources() {
            let Some(dir) = source.strip_prefix(&prefix) else {
                continue;
            };
            let dir = dir.trim_end_matches('/');
            if dir.is_empty() || dir.split('/').any(|seg| seg == "..") {
                continue;
            }
            if !dirs.iter().any(|d| d == dir) {
                dirs.push(dir.to_owned());
            }
        }
        Self::new(name, name).with_volume_dirs(dirs)
    }
}

/// Plugin driven by a [`ServiceBlueprint`], with swappable mutators and checks.
pub struct StandardServicePlugin<M: Mutators = CommonCompileLogic, C: Checks = CommonBuildChecks> {
    blueprint: ServiceBlueprint,
    mutators: M,
    checks: C,
}

impl StandardServicePlugin {
    pub fn new(blueprint: ServiceBlueprint) -> Self {
        Self::with_parts(blueprint, CommonCompileLogic, CommonBuildChecks)
    }
}

impl<M: Mutators, C: Checks> StandardServicePlugin<M, C> {
    pub fn with_parts(blueprint: ServiceBlueprint, mutators: M, checks: C) -> Self {
        Self {
            blueprint,
            mutators,
            checks,
        }
    }

    pub fn blueprint(&self) -> &ServiceBlueprint {
        &self.blueprint
    }

    fn component(&self, method: &str) -> String {
        PluginError::component_name(self.plugin_name(), method, &self.blueprint.name)
    }

    fn write_generated_files(&self, tmp_path: &Path, sink: &mut BuildSink) -> Result<(), PluginError> {
        let name = &self.blueprint.name;
        for file in &self.blueprint.generated_files {
            let source = tmp_path.join(name).join(&file.path);
            if let Some(parent) = source.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| PluginError::unhandled(self.component("build"), &e))?;
            }
            std::fs::write(&source, &file.contents)
                .map_err(|e| PluginError::unhandled(self.component("build"), &e))?;

            sink.zip_list.push(ZipEntry {
                source,
                archive_path: format!("volumes/{name}/{}", file.path),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl<M: Mutators, C: Checks> ServicePlugin for StandardServicePlugin<M, C> {
    fn service_name(&self) -> &str {
        &self.blueprint.name
    }

    async fn init(&self) -> Result<(), PluginError> {
        tracing::debug!(service = %self.blueprint.name, "ServiceBuilder::init()");
        Ok(())
    }

    async fn compile(
        &self,
        template: &ServiceDefinition,
        options: &BuildOptions,
    ) -> Result<CompileOutput, PluginError> {
        let name = &self.blueprint.name;
        tracing::debug!(service = %name, "ServiceBuilder::compile() - started");

        let (definition, report) = compile::compile_with(&self.mutators, template, options, name);

        tracing::info!(
            service = %name,
            modified = report.modified_count(),
            revision = definition.revision,
            "ServiceBuilder::compile() - Results"
        );
        tracing::debug!(service = %name, ?report, "ServiceBuilder::compile() - completed");

        Ok(CompileOutput {
            outcome: Outcome::Service,
            definition,
            report,
        })
    }

    async fn issues(
        &self,
        definition: &ServiceDefinition,
        options: &BuildOptions,
        _tmp_path: &Path,
    ) -> Result<Vec<Issue>, PluginError> {
        let name = &self.blueprint.name;
        tracing::debug!(service = %name, "ServiceBuilder::issues() - started");

        let mut issues = self.checks.check_port_conflicts(definition, options, name);
        issues.extend(self.checks.check_dependency_services(definition, options, name));
        issues.extend(self.checks.check_network_conflicts(definition, options, name));

        tracing::debug!(service = %name, count = issues.len(), "ServiceBuilder::issues() - Issues found");
        Ok(issues)
    }

    async fn assume(
        &self,
        definition: &ServiceDefinition,
        _options: &BuildOptions,
    ) -> Result<Option<ServiceDefinition>, PluginError> {
        let Some(defaults) = &self.blueprint.defaults else {
            return Ok(None);
        };
        let name = &self.blueprint.name;

        let mut assumed = definition.clone();
        if assumed.missing_required_fields().contains(&"container_name") {
            assumed.container_name = Some(name.clone());
        }
        if assumed.missing_required_fields().contains(&"image") {
            assumed.image = defaults.image.clone();
        }
        if assumed.missing_required_fields().contains(&"restart") {
            assumed.restart = Some(defaults.restart.clone());
        }
        for (key, value) in &defaults.environment {
            if assumed.env_var(key).is_none() {
                assumed.upsert_env_var(key, value);
            }
        }

        tracing::debug!(
            service = %name,
            missing = ?assumed.missing_required_fields(),
            "ServiceBuilder::assume() - completed"
        );
        Ok(Some(assumed))
    }

    async fn build(
        &self,
        _definition: &ServiceDefinition,
        _options: &BuildOptions,
        tmp_path: &Path,
        sink: &mut BuildSink,
    ) -> Result<Outcome, PluginError> {
        let blueprint = &self.blueprint;
        tracing::debug!(service = %blueprint.name, "ServiceBuilder::build() - started");

        sink.prebuild_scripts.push(ScriptFragment::new(
            &blueprint.name,
            "Create required service directories for first launch",
            script::create_volume_dirs(&blueprint.name, &blueprint.volume_dirs),
        ));
        sink.postbuild_scripts.push(
            ScriptFragment::new(
                &blueprint.name,
                "Ensure required service directories exist for launch",
                script::check_volume_dirs(&blueprint.display_name, &blueprint.name, &blueprint.volume_dirs),
            )
            .with_multiline_comment(format!(
                "Run after prebuild.sh and before `docker compose up`.\nWarns if {} cannot find its volumes.",
                blueprint.display_name
            )),
        );

        self.write_generated_files(tmp_path, sink)?;

        tracing::debug!(
            service = %blueprint.name,
            prebuild = sink.prebuild_scripts.len(),
            postbuild = sink.postbuild_scripts.len(),
            files = sink.zip_list.len(),
            "ServiceBuilder::build() - completed"
        );
        Ok(Outcome::Service)
    }
}
