mod build;
mod check;
mod init;
mod list;

use std::path::PathBuf;

use stackgen_core::{
    BuildOptions, BuiltinTemplates, ChainedTemplateStore, DirTemplateStore, Issue, StackConfig,
};
use stackgen_engine::{CancellationToken, Engine, EngineConfig, ServiceFailure};

pub use build::build;
pub use check::check;
pub use init::init_project;
pub use list::list;

/// Which services to process and with which options.
#[derive(clap::Args)]
pub struct SelectionArgs {
    /// Build options file (default: [stack] options_file)
    #[arg(long)]
    options: Option<PathBuf>,
    /// Service to select; repeat to select several (replaces selected_services)
    #[arg(long = "service", short = 's')]
    services: Vec<String>,
    /// Abort on the first service failure
    #[arg(long)]
    fail_fast: bool,
}

/// Configuration and paths of the stack in the current directory.
pub(crate) struct Project {
    pub dir: PathBuf,
    pub config: StackConfig,
}

impl Project {
    pub fn load() -> anyhow::Result<Self> {
        let dir = PathBuf::from(".");
        let config = StackConfig::load(&dir)?;
        Ok(Self { dir, config })
    }

    /// Project templates first, then the built-in ones.
    pub fn template_store(&self) -> ChainedTemplateStore {
        let store = ChainedTemplateStore::new();
        let store = match self.config.templates_dir(&self.dir) {
            Some(templates) => store.with(DirTemplateStore::new(templates)),
            None => store,
        };
        store.with(BuiltinTemplates::new())
    }

    pub fn engine(&self, selection: &SelectionArgs) -> Engine<ChainedTemplateStore> {
        let mut config = EngineConfig::from(&self.config.engine);
        config.fail_fast |= selection.fail_fast;
        Engine::with_store(self.template_store()).with_config(config)
    }

    /// Options file from the flag or config, with `--service` overriding the selection.
    pub fn options(&self, selection: &SelectionArgs) -> anyhow::Result<BuildOptions> {
        let path = match &selection.options {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("options file {} not found", path.display());
                }
                path.clone()
            }
            None => self.dir.join(&self.config.stack.options_file),
        };

        let mut options = if path.exists() {
            BuildOptions::load(&path)?
        } else {
            tracing::debug!(path = %path.display(), "No options file, using defaults");
            BuildOptions::default()
        };

        if !selection.services.is_empty() {
            for name in &selection.services {
                stackgen_core::options::validate_service_name(name)?;
            }
            options.selected_services = selection.services.clone();
        }
        if options.selected_services.is_empty() {
            anyhow::bail!("no services selected. Use --service <name> or set selected_services in {}", path.display());
        }
        Ok(options)
    }

    pub fn output_dir(&self, out: Option<PathBuf>) -> PathBuf {
        out.unwrap_or_else(|| self.dir.join(&self.config.stack.output_dir))
    }
}

/// Token cancelled on Ctrl-C.
pub(crate) fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling build...");
            on_signal.cancel();
        }
    });
    token
}

pub(crate) fn print_issues(issues: &[Issue]) {
    for issue in issues {
        eprintln!("{issue}");
    }
}

pub(crate) fn print_failures(failures: &[ServiceFailure]) {
    for failure in failures {
        eprintln!("[failed] {failure}");
        match failure.plugin_error() {
            Some(plugin_err) => {
                eprintln!("  {}: {}", plugin_err.component, plugin_err.message);
                match serde_json::to_string_pretty(&plugin_err.error) {
                    Ok(detail) => eprintln!("{detail}"),
                    Err(_) => eprintln!("  {}", plugin_err.error),
                }
            }
            None => eprintln!("  {}", failure.source),
        }
    }
}

/// Scratch space for files plugins generate during a run.
pub(crate) fn tmp_dir() -> anyhow::Result<tempfile::TempDir> {
    Ok(tempfile::Builder::new().prefix("stackgen-").tempdir()?)
}
