use std::path::Path;

const STACKGEN_TOML: &str = r#"[stack]
name = "iotstack"
# templates_dir = ".templates"
# output_dir = "build"
# options_file = "build-options.toml"

[engine]
# fail_fast = false
# service_timeout_secs = 30
# archive = true

[networks.iotstack_nw]
driver = "bridge"
"#;

const BUILD_OPTIONS_TOML: &str = r#"selected_services = ["adguardhome", "mosquitto"]

# [services.adguardhome]
# image_tag = "latest"
# logging = true
#
# [services.adguardhome.ports]
# "3000/tcp" = 3002
#
# [services.adguardhome.environment]
# TZ = "Etc/UTC"
"#;

/// Create starter configuration in the current directory.
pub async fn init_project() -> anyhow::Result<()> {
    let mut created = Vec::new();

    for (file, contents) in [
        ("stackgen.toml", STACKGEN_TOML),
        ("build-options.toml", BUILD_OPTIONS_TOML),
    ] {
        let path = Path::new(file);
        if path.exists() {
            eprintln!("{file} already exists, skipping");
        } else {
            std::fs::write(path, contents)?;
            created.push(file);
        }
    }

    if created.is_empty() {
        println!("Nothing to create, already initialized.");
    } else {
        for f in &created {
            println!("Created {f}");
        }
    }

    println!();
    println!("Next steps:");
    println!();
    println!("  1. See which services are available:");
    println!("     stackgen list");
    println!();
    println!("  2. Pick services and overrides in build-options.toml");
    println!();
    println!("  3. Check for conflicts:");
    println!("     stackgen check");
    println!();
    println!("  4. Build the stack:");
    println!("     stackgen build");

    Ok(())
}
