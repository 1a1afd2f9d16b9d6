use std::path::{Path, PathBuf};

use stackgen_build::bundle::{self, BundleContents};
use stackgen_build::{BuildSink, ComposeGenerator, ScriptPhase, ScriptRenderer};
use stackgen_core::{ScriptFragment, ServiceDefinition, StackConfig, ZipEntry};

use crate::error::ArtifactError;

/// Everything the build phase produced, in processing order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildArtifact {
    pub services: Vec<(String, ServiceDefinition)>,
    pub prebuild_scripts: Vec<ScriptFragment>,
    pub postbuild_scripts: Vec<ScriptFragment>,
    pub zip_list: Vec<ZipEntry>,
}

impl BuildArtifact {
    /// Add one service's compiled definition and its build output.
    pub fn append(&mut self, service: &str, definition: ServiceDefinition, sink: BuildSink) {
        self.services.push((service.to_owned(), definition));
        self.prebuild_scripts.extend(sink.prebuild_scripts);
        self.postbuild_scripts.extend(sink.postbuild_scripts);
        self.zip_list.extend(sink.zip_list);
    }

    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(name, _)| name.as_str())
    }

    pub fn prebuild_script(&self, stack_name: &str) -> String {
        ScriptRenderer::new(ScriptPhase::Prebuild, stack_name, &self.prebuild_scripts).render()
    }

    pub fn postbuild_script(&self, stack_name: &str) -> String {
        ScriptRenderer::new(ScriptPhase::Postbuild, stack_name, &self.postbuild_scripts).render()
    }

    pub fn compose(&self, config: &StackConfig) -> Result<String, ArtifactError> {
        Ok(ComposeGenerator::new(&config.stack.name, &self.services, &config.networks).render()?)
    }

    /// Render and write the artifact into `dir`, replacing any previous one.
    pub fn write_to(&self, dir: &Path, config: &StackConfig) -> Result<PathBuf, ArtifactError> {
        let compose = self.compose(config)?;
        let prebuild = self.prebuild_script(&config.stack.name);
        let postbuild = self.postbuild_script(&config.stack.name);

        let contents = BundleContents {
            compose: &compose,
            prebuild: &prebuild,
            postbuild: &postbuild,
            files: &self.zip_list,
            archive: config.engine.archive,
        };
        Ok(bundle::write_bundle(dir, &contents)?)
    }
}
