use super::{Project, SelectionArgs, cancel_on_ctrl_c, print_failures, print_issues, tmp_dir};

pub async fn check(selection: &SelectionArgs) -> anyhow::Result<()> {
    let project = Project::load()?;
    let options = project.options(selection)?;
    let engine = project.engine(selection);
    let tmp = tmp_dir()?;

    let report = engine.check(&options, tmp.path(), &cancel_on_ctrl_c()).await?;

    print_issues(&report.issues);
    print_failures(&report.failures);

    if report.has_blocking_issues() {
        let blocking = report.issues.iter().filter(|i| i.is_error()).count();
        anyhow::bail!("{blocking} blocking issue(s) found");
    }
    if !report.failures.is_empty() {
        anyhow::bail!("{} service(s) could not be checked", report.failures.len());
    }

    let warnings = report.issues.len();
    println!(
        "No blocking issues in {} service(s) ({warnings} warning(s))",
        report.runs.len()
    );
    Ok(())
}
