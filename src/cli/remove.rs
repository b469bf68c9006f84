//! Remove command implementation

use anyhow::Result;
use colored::Colorize;

use vltpkg::config::Config;

pub fn run(packages: &[String], config: &Config) -> Result<()> {
    let registry = config.open_registry()?;

    for package in packages {
        let id = super::registered_id(registry.as_ref(), package)?;

        let users = registry.usage(&id)?;
        if !users.is_empty() {
            let names: Vec<String> = users.iter().map(ToString::to_string).collect();
            println!(
                "  {} {} is required by: {}",
                "!".yellow(),
                id.to_string().bold(),
                names.join(", ")
            );
        }

        registry.remove(&id)?;
        println!("  {} Removed {}", "✓".green(), id.to_string().bold());
    }

    Ok(())
}
