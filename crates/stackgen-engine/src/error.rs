use std::fmt;
use std::time::Duration;

use stackgen_build::PluginError;
use stackgen_build::bundle::BundleError;
use stackgen_core::{Issue, TemplateError};

use crate::lifecycle::TransitionError;

/// Lifecycle step a service failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Init,
    Compile,
    Assume,
    Issues,
    Build,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => f.write_str("load"),
            Self::Init => f.write_str("init()"),
            Self::Compile => f.write_str("compile()"),
            Self::Assume => f.write_str("assume()"),
            Self::Issues => f.write_str("issues()"),
            Self::Build => f.write_str("build()"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no template found for '{service}'")]
    TemplateNotFound { service: String },

    #[error("template for '{service}' could not be loaded")]
    Template {
        service: String,
        source: TemplateError,
    },

    #[error("plugin internal error")]
    Plugin(#[from] PluginError),

    #[error("{stage} timed out after {}s", .timeout.as_secs_f64())]
    Timeout { stage: Stage, timeout: Duration },

    #[error(transparent)]
    Lifecycle(#[from] TransitionError),
}

/// One service that could not finish. Other services are unaffected
/// unless the engine runs fail-fast.
#[derive(Debug, thiserror::Error)]
#[error("service '{service}' failed during {stage}")]
pub struct ServiceFailure {
    pub service: String,
    pub stage: Stage,
    pub source: ServiceError,
}

impl ServiceFailure {
    pub fn new(service: impl Into<String>, stage: Stage, source: ServiceError) -> Self {
        Self {
            service: service.into(),
            stage,
            source,
        }
    }

    /// The structured plugin error, if the failure came from a plugin.
    pub fn plugin_error(&self) -> Option<&PluginError> {
        match &self.source {
            ServiceError::Plugin(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no services selected")]
    NoServices,

    #[error("service '{0}' is selected more than once")]
    DuplicateService(String),

    #[error(transparent)]
    InvalidService(#[from] stackgen_core::Error),

    #[error("{} blocking issue(s) found", .issues.iter().filter(|i| i.is_error()).count())]
    ConflictDetected { issues: Vec<Issue> },

    #[error(transparent)]
    ServiceFailed(Box<ServiceFailure>),

    #[error("build cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("failed to render docker-compose.yml")]
    Compose(#[from] serde_yaml::Error),

    #[error(transparent)]
    Bundle(#[from] BundleError),
}
