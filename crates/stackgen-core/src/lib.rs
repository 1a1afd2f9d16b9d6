//! Core types and configuration for stackgen.
//!
//! This crate defines the `stackgen.toml` schema ([`StackConfig`]), the
//! per-build user selection ([`BuildOptions`]), the compose service model
//! ([`ServiceDefinition`]), the report and script types shared by plugins
//! and the engine, and the [`TemplateStore`] that supplies base templates.

pub mod config;
pub mod error;
pub mod fragment;
pub mod issue;
pub mod options;
pub mod service;
pub mod template;

pub use config::{EngineSection, NetworkConfig, StackConfig, StackSection};
pub use error::{Error, Result};
pub use fragment::{ScriptFragment, ZipEntry};
pub use issue::{Issue, IssueKind, Severity};
pub use options::{BuildOptions, ServiceOptions};
pub use service::{LoggingConfig, PortMapping, PortParseError, Protocol, ServiceDefinition};
pub use template::{
    BuiltinTemplates, ChainedTemplateStore, DirTemplateStore, MemoryTemplateStore, TemplateError,
    TemplateStore,
};
