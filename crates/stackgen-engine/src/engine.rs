use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use stackgen_build::{BuildSink, CompileReport, Outcome, PluginError, PluginRegistry, ServicePlugin};
use stackgen_core::{BuildOptions, BuiltinTemplates, EngineSection, Issue, ServiceDefinition, TemplateError, TemplateStore};
use tokio_util::sync::CancellationToken;

use crate::aggregate;
use crate::artifact::BuildArtifact;
use crate::error::{EngineError, ServiceError, ServiceFailure, Stage};
use crate::lifecycle::{LifecycleState, ServiceRun, TransitionError};

pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Abort the whole build on the first service failure.
    pub fail_fast: bool,
    /// Time budget for one service, shared by all of its plugin calls
    /// (analysis and `build()`). Time spent waiting for other services
    /// does not count.
    pub service_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
        }
    }
}

impl From<&EngineSection> for EngineConfig {
    fn from(section: &EngineSection) -> Self {
        Self {
            fail_fast: section.fail_fast,
            service_timeout: Duration::from_secs(section.service_timeout_secs),
        }
    }
}

/// Per-service result of a successful build.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceSummary {
    pub name: String,
    pub outcome: Outcome,
    pub compile: CompileReport,
    pub assumed: bool,
}

#[derive(Debug)]
pub struct CheckReport {
    pub issues: Vec<Issue>,
    pub failures: Vec<ServiceFailure>,
    pub runs: Vec<ServiceRun>,
}

impl CheckReport {
    pub fn has_blocking_issues(&self) -> bool {
        aggregate::is_blocking(&self.issues)
    }
}

#[derive(Debug)]
pub struct BuildReport {
    pub artifact: BuildArtifact,
    /// Non-blocking issues (warnings) found during analysis.
    pub issues: Vec<Issue>,
    pub services: Vec<ServiceSummary>,
    /// Services left out of the artifact. Empty in fail-fast mode.
    pub failures: Vec<ServiceFailure>,
    pub runs: Vec<ServiceRun>,
}

/// A service that made it through `issues()`.
struct Analyzed {
    name: String,
    plugin: Arc<dyn ServicePlugin>,
    definition: ServiceDefinition,
    compile: CompileReport,
    assumed: bool,
    issues: Vec<Issue>,
    run: ServiceRun,
    /// Unused part of the service's time budget.
    remaining: Duration,
}

enum Interrupt {
    Failed(ServiceFailure),
    Cancelled,
}

/// Everything analysis produced, split by outcome.
struct Analysis {
    analyzed: Vec<Analyzed>,
    failures: Vec<ServiceFailure>,
    failed_runs: Vec<ServiceRun>,
    issues: Vec<Issue>,
}

/// Drives every selected service through its plugin lifecycle.
pub struct Engine<S: TemplateStore = BuiltinTemplates> {
    store: S,
    registry: PluginRegistry,
    config: EngineConfig,
}

impl Engine<BuiltinTemplates> {
    pub fn new() -> Self {
        Self::with_store(BuiltinTemplates::new())
    }
}

impl Default for Engine<BuiltinTemplates> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: TemplateStore> Engine<S> {
    pub fn with_store(store: S) -> Self {
        Self {
            store,
            registry: PluginRegistry::builtin(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: PluginRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Check ──

    /// Run every service through `issues()` and report what was found.
    pub async fn check(
        &self,
        options: &BuildOptions,
        tmp_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<CheckReport, EngineError> {
        let analysis = self.analyze(options, tmp_path, cancel).await?;

        let mut runs: Vec<ServiceRun> = analysis.analyzed.into_iter().map(|a| a.run).collect();
        runs.extend(analysis.failed_runs);
        sort_by_selection(&mut runs, options);
        Ok(CheckReport {
            issues: analysis.issues,
            failures: analysis.failures,
            runs,
        })
    }

    // ── Build ──

    /// Analyze all selected services, then build them in processing order.
    ///
    /// Error-severity issues stop the build before any `build()` call.
    pub async fn build(
        &self,
        options: &BuildOptions,
        tmp_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<BuildReport, EngineError> {
        let analysis = self.analyze(options, tmp_path, cancel).await?;

        if aggregate::is_blocking(&analysis.issues) {
            tracing::warn!(count = analysis.issues.len(), "Blocking issues found, build halted");
            return Err(EngineError::ConflictDetected {
                issues: analysis.issues,
            });
        }

        let mut artifact = BuildArtifact::default();
        let mut services = Vec::new();
        let mut failures = analysis.failures;
        let mut runs = analysis.failed_runs;

        for mut analyzed in analysis.analyzed {
            let name = analyzed.name.clone();
            let mut sink = BuildSink::new();
            let component = self.component(analyzed.plugin.as_ref(), "build");

            let result = self
                .call(
                    &name,
                    Stage::Build,
                    component,
                    cancel,
                    &mut analyzed.remaining,
                    analyzed.plugin.build(&analyzed.definition, options, tmp_path, &mut sink),
                )
                .await;

            match result {
                Ok(outcome) => {
                    analyzed
                        .run
                        .advance(LifecycleState::Built)
                        .and_then(|()| analyzed.run.advance(LifecycleState::Done))
                        .map_err(|e| {
                            EngineError::ServiceFailed(Box::new(ServiceFailure::new(&name, Stage::Build, e.into())))
                        })?;
                    tracing::info!(
                        service = %name,
                        prebuild = sink.prebuild_scripts.len(),
                        postbuild = sink.postbuild_scripts.len(),
                        files = sink.zip_list.len(),
                        "Service built"
                    );
                    artifact.append(&name, analyzed.definition, sink);
                    services.push(ServiceSummary {
                        name,
                        outcome,
                        compile: analyzed.compile,
                        assumed: analyzed.assumed,
                    });
                    runs.push(analyzed.run);
                }
                Err(Interrupt::Cancelled) => return Err(EngineError::Cancelled),
                Err(Interrupt::Failed(failure)) => {
                    analyzed.run.fail();
                    if self.config.fail_fast {
                        return Err(EngineError::ServiceFailed(Box::new(failure)));
                    }
                    tracing::warn!(service = %name, error = %failure.source, "Service left out of artifact");
                    failures.push(failure);
                    runs.push(analyzed.run);
                }
            }
        }

        sort_by_selection(&mut runs, options);
        Ok(BuildReport {
            artifact,
            issues: analysis.issues,
            services,
            failures,
            runs,
        })
    }

    // ── Analysis ──

    async fn analyze(
        &self,
        options: &BuildOptions,
        tmp_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Analysis, EngineError> {
        validate_selection(options)?;

        let scope = cancel.child_token();
        let results = futures::future::join_all(
            options
                .selected_services
                .iter()
                .map(|name| self.analyze_service(name, options, tmp_path, &scope)),
        )
        .await;

        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut analyzed = Vec::new();
        let mut failures = Vec::new();
        let mut failed_runs = Vec::new();
        let mut fail_fast_trigger = None;
        for (run, result) in results {
            match result {
                Ok(a) => analyzed.push(a),
                Err(Interrupt::Failed(failure)) => {
                    if self.config.fail_fast && fail_fast_trigger.is_none() {
                        fail_fast_trigger = Some(failure);
                    } else {
                        failures.push(failure);
                    }
                    failed_runs.push(run);
                }
                Err(Interrupt::Cancelled) => failed_runs.push(run),
            }
        }
        if let Some(failure) = fail_fast_trigger {
            return Err(EngineError::ServiceFailed(Box::new(failure)));
        }

        let reported: Vec<Issue> = analyzed.iter().flat_map(|a| a.issues.iter().cloned()).collect();
        let compiled: Vec<(&str, &ServiceDefinition)> =
            analyzed.iter().map(|a| (a.name.as_str(), &a.definition)).collect();
        let issues = aggregate::merge(reported, aggregate::port_collisions(&compiled));

        tracing::info!(
            services = analyzed.len(),
            failed = failures.len(),
            issues = issues.len(),
            "Analysis complete"
        );
        Ok(Analysis {
            analyzed,
            failures,
            failed_runs,
            issues,
        })
    }

    async fn analyze_service(
        &self,
        name: &str,
        options: &BuildOptions,
        tmp_path: &Path,
        scope: &CancellationToken,
    ) -> (ServiceRun, Result<Analyzed, Interrupt>) {
        let mut run = ServiceRun::new(name);
        let result = self.drive(&mut run, options, tmp_path, scope).await;

        if let Err(interrupt) = &result {
            run.fail();
            match interrupt {
                Interrupt::Failed(failure) => {
                    tracing::warn!(service = %name, stage = %failure.stage, error = %failure.source, "Service failed");
                    if self.config.fail_fast {
                        scope.cancel();
                    }
                }
                Interrupt::Cancelled => tracing::debug!(service = %name, "Service cancelled"),
            }
        }
        (run, result)
    }

    /// Load → init → compile → (assume → recompile)? → issues for one service.
    async fn drive(
        &self,
        run: &mut ServiceRun,
        options: &BuildOptions,
        tmp_path: &Path,
        scope: &CancellationToken,
    ) -> Result<Analyzed, Interrupt> {
        let name = run.service.clone();
        let mut budget = self.config.service_timeout;

        if scope.is_cancelled() {
            return Err(Interrupt::Cancelled);
        }
        let template = self.store.load(&name).map_err(|e| {
            let error = match e {
                TemplateError::NotFound(_) => ServiceError::TemplateNotFound { service: name.clone() },
                other => ServiceError::Template {
                    service: name.clone(),
                    source: other,
                },
            };
            Interrupt::Failed(ServiceFailure::new(&name, Stage::Load, error))
        })?;
        run.advance(LifecycleState::Loaded)
            .map_err(lifecycle_failure(&name, Stage::Load))?;

        let plugin = self.registry.resolve(&name, &template);
        tracing::debug!(service = %name, plugin = plugin.plugin_name(), "Template loaded");

        let component = self.component(plugin.as_ref(), "init");
        self.call(&name, Stage::Init, component, scope, &mut budget, plugin.init())
            .await?;
        run.advance(LifecycleState::Initialized)
            .map_err(lifecycle_failure(&name, Stage::Init))?;

        let component = self.component(plugin.as_ref(), "compile");
        let compiled = self
            .call(&name, Stage::Compile, component, scope, &mut budget, plugin.compile(&template, options))
            .await?;
        run.advance(LifecycleState::Compiled)
            .map_err(lifecycle_failure(&name, Stage::Compile))?;

        let mut definition = compiled.definition;
        let mut compile = compiled.report;
        let mut assumed = false;

        let component = self.component(plugin.as_ref(), "assume");
        let defaults = self
            .call(&name, Stage::Assume, component, scope, &mut budget, plugin.assume(&definition, options))
            .await?;
        if let Some(with_defaults) = defaults {
            run.advance(LifecycleState::Assumed)
                .map_err(lifecycle_failure(&name, Stage::Assume))?;
            let component = self.component(plugin.as_ref(), "compile");
            let recompiled = self
                .call(&name, Stage::Compile, component, scope, &mut budget, plugin.compile(&with_defaults, options))
                .await?;
            run.advance(LifecycleState::Recompiled)
                .map_err(lifecycle_failure(&name, Stage::Compile))?;
            definition = recompiled.definition;
            compile = recompiled.report;
            assumed = true;
        }

        let component = self.component(plugin.as_ref(), "issues");
        let issues = self
            .call(&name, Stage::Issues, component, scope, &mut budget, plugin.issues(&definition, options, tmp_path))
            .await?;
        run.advance(LifecycleState::IssuesChecked)
            .map_err(lifecycle_failure(&name, Stage::Issues))?;

        tracing::info!(service = %name, issues = issues.len(), assumed, "Service analyzed");
        Ok(Analyzed {
            name,
            plugin,
            definition,
            compile,
            assumed,
            issues,
            run: run.clone(),
            remaining: budget,
        })
    }

    fn component(&self, plugin: &dyn ServicePlugin, method: &str) -> String {
        PluginError::component_name(plugin.plugin_name(), method, plugin.service_name())
    }

    /// Run one plugin call within what is left of the service's time
    /// budget, catching panics and returning early when `cancel` fires.
    async fn call<T, F>(
        &self,
        service: &str,
        stage: Stage,
        component: String,
        cancel: &CancellationToken,
        budget: &mut Duration,
        call: F,
    ) -> Result<T, Interrupt>
    where
        F: Future<Output = Result<T, PluginError>>,
    {
        let failed = |error| Interrupt::Failed(ServiceFailure::new(service, stage, error));
        let guarded = AssertUnwindSafe(call).catch_unwind();
        let started = tokio::time::Instant::now();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
            outcome = tokio::time::timeout(*budget, guarded) => outcome,
        };
        *budget = budget.saturating_sub(started.elapsed());

        match outcome {
            Err(_) => Err(failed(ServiceError::Timeout {
                stage,
                timeout: self.config.service_timeout,
            })),
            Ok(Err(panic)) => Err(failed(ServiceError::Plugin(PluginError::from_panic(
                component,
                panic.as_ref(),
            )))),
            Ok(Ok(Err(e))) => Err(failed(ServiceError::Plugin(e))),
            Ok(Ok(Ok(value))) => Ok(value),
        }
    }
}

fn lifecycle_failure(service: &str, stage: Stage) -> impl Fn(TransitionError) -> Interrupt + '_ {
    move |e| Interrupt::Failed(ServiceFailure::new(service, stage, ServiceError::Lifecycle(e)))
}

fn validate_selection(options: &BuildOptions) -> Result<(), EngineError> {
    if options.selected_services.is_empty() {
        return Err(EngineError::NoServices);
    }
    for (index, name) in options.selected_services.iter().enumerate() {
        stackgen_core::options::validate_service_name(name)?;
        if options.selected_services[..index].contains(name) {
            return Err(EngineError::DuplicateService(name.clone()));
        }
    }
    Ok(())
}

fn sort_by_selection(runs: &mut [ServiceRun], options: &BuildOptions) {
    runs.sort_by_key(|run| {
        options
            .selected_services
            .iter()
            .position(|s| *s == run.service)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_failure_keeps_the_stage() {
        let mut run = ServiceRun::new("app");
        let err = run.advance(LifecycleState::IssuesChecked).unwrap_err();

        let Interrupt::Failed(failure) = lifecycle_failure("app", Stage::Issues)(err) else {
            panic!("expected a failure");
        };
        assert_eq!(failure.service, "app");
        assert_eq!(failure.stage, Stage::Issues);
        assert!(matches!(failure.source, ServiceError::Lifecycle(_)));
    }
}
