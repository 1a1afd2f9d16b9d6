//! Service plugins and artifact generation for stackgen.
//!
//! # Plugin lifecycle
//!
//! ```text
//! init()     ── one-time setup
//! compile()  ── template + build options → new definition snapshot (8 mutators)
//! assume()   ── optional: fill unset required fields, then compile() again
//! issues()   ── port conflicts, missing dependencies, network conflict
//! build()    ── prebuild/postbuild script fragments + files for the artifact
//! ```
//!
//! # Artifact layout
//!
//! ```text
//! <output_dir>/
//!   docker-compose.yml   ── services in processing order
//!   prebuild.sh          ── one subshell block per fragment
//!   postbuild.sh
//!   volumes/<service>/…  ── files listed by plugins
//!   build.zip            ── everything above (optional)
//! ```

pub mod bundle;
pub mod catalog;
pub mod checks;
pub mod compile;
pub mod compose;
pub mod plugin;
pub mod script;
pub mod standard;

pub use catalog::PluginRegistry;
pub use checks::{Checks, CommonBuildChecks};
pub use compile::{Change, CommonCompileLogic, CompileReport, Mutation, Mutators};
pub use compose::ComposeGenerator;
pub use plugin::{BuildSink, CompileOutput, Outcome, PluginError, ServicePlugin};
pub use script::{ScriptPhase, ScriptRenderer};
pub use standard::{GeneratedFile, ServiceBlueprint, ServiceDefaults, StandardServicePlugin};
