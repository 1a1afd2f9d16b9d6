mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::SelectionArgs;

#[derive(Parser)]
#[command(name = "stackgen", about = "Generate docker-compose stacks and setup scripts from service templates")]
#[command(version)]
struct Cli {
    /// Log lifecycle details (overridden by RUST_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create stackgen.toml and build-options.toml in the current directory
    Init,
    /// List available service templates
    List,
    /// Check selected services for conflicts without building
    Check {
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Build docker-compose.yml, prebuild.sh and postbuild.sh
    Build {
        #[command(flatten)]
        selection: SelectionArgs,
        /// Output directory (default: [stack] output_dir)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Fail if any service could not be built
        #[arg(long)]
        strict: bool,
        /// Do not write build.zip
        #[arg(long)]
        no_archive: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => commands::init_project().await?,
        Commands::List => commands::list().await?,
        Commands::Check { selection } => commands::check(&selection).await?,
        Commands::Build {
            selection,
            out,
            strict,
            no_archive,
        } => commands::build(&selection, out, strict, no_archive).await?,
    }

    Ok(())
}
