use std::path::PathBuf;

use stackgen_engine::EngineError;

use super::{Project, SelectionArgs, cancel_on_ctrl_c, print_failures, print_issues, tmp_dir};

pub async fn build(
    selection: &SelectionArgs,
    out: Option<PathBuf>,
    strict: bool,
    no_archive: bool,
) -> anyhow::Result<()> {
    let mut project = Project::load()?;
    if no_archive {
        project.config.engine.archive = false;
    }
    let options = project.options(selection)?;
    let engine = project.engine(selection);
    let tmp = tmp_dir()?;
    let cancel = cancel_on_ctrl_c();

    tracing::info!(services = ?options.selected_services, "Building stack '{}'", project.config.stack.name);

    let report = match engine.build(&options, tmp.path(), &cancel).await {
        Ok(report) => report,
        Err(EngineError::ConflictDetected { issues }) => {
            print_issues(&issues);
            let blocking = issues.iter().filter(|i| i.is_error()).count();
            anyhow::bail!("build halted: {blocking} blocking issue(s) found");
        }
        Err(EngineError::ServiceFailed(failure)) => {
            print_failures(std::slice::from_ref(failure.as_ref()));
            anyhow::bail!("build aborted (fail-fast)");
        }
        Err(e) => return Err(e.into()),
    };

    print_issues(&report.issues);
    print_failures(&report.failures);

    if strict && !report.failures.is_empty() {
        anyhow::bail!("{} service(s) failed (--strict)", report.failures.len());
    }
    if report.services.is_empty() {
        anyhow::bail!("no service could be built");
    }

    let out_dir = project.output_dir(out);
    let written = report.artifact.write_to(&out_dir, &project.config)?;

    println!("Built {} service(s) into {}", report.services.len(), written.display());
    for service in &report.services {
        let assumed = if service.assumed { ", defaults assumed" } else { "" };
        println!(
            "  {} ({} option change(s){assumed})",
            service.name,
            service.compile.modified_count()
        );
    }
    println!();
    println!("Next steps:");
    println!("  cd {}", written.display());
    println!("  sh prebuild.sh");
    println!("  sh postbuild.sh");
    println!("  docker compose up -d");

    Ok(())
}
