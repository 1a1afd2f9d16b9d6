use stackgen_build::PluginRegistry;
use stackgen_core::TemplateStore;

use super::Project;

pub async fn list() -> anyhow::Result<()> {
    let project = Project::load()?;
    let store = project.template_store();
    let registry = PluginRegistry::builtin();

    let names = store.available();
    if names.is_empty() {
        println!("No service templates found.");
        return Ok(());
    }

    let width = names.iter().map(String::len).max().unwrap_or(0);
    for name in &names {
        let kind = if registry.get(name).is_some() {
            "built-in plugin"
        } else {
            "template"
        };
        println!("{name:<width$}  {kind}");
    }
    Ok(())
}
