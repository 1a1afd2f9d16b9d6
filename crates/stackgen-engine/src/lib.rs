//! Orchestration engine for stackgen.
//!
//! The [`Engine`] loads each selected service's template, drives its plugin
//! through `init → compile → (assume → compile)? → issues` concurrently,
//! aggregates issues across services, and, when nothing blocks, calls
//! `build()` for each service in processing order to assemble a
//! [`BuildArtifact`].

pub mod aggregate;
pub mod artifact;
pub mod engine;
pub mod error;
pub mod lifecycle;

pub use artifact::BuildArtifact;
pub use engine::{BuildReport, CheckReport, DEFAULT_SERVICE_TIMEOUT, Engine, EngineConfig, ServiceSummary};
pub use error::{ArtifactError, EngineError, ServiceError, ServiceFailure, Stage};
pub use lifecycle::{LifecycleState, ServiceRun, TransitionError};
pub use tokio_util::sync::CancellationToken;
