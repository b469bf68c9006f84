//! Depends command implementation

use anyhow::Result;
use colored::Colorize;

use vltpkg::config::Config;

pub fn run(package: &str, reverse: bool, installed: bool, config: &Config) -> Result<()> {
    let registry = config.open_registry()?;
    let id = super::registered_id(registry.as_ref(), package)?;

    if reverse {
        println!("{} {}", "Packages depending on".bold(), id.to_string().cyan());
        let users = registry.usage(&id)?;
        if users.is_empty() {
            println!("  (none)");
        }
        for user in users {
            println!("  {}", user);
        }
        return Ok(());
    }

    let report = registry.analyze_dependencies(&id, installed)?;
    println!("{} {}", "Dependencies of".bold(), id.to_string().cyan());
    if report.resolved.is_empty() && report.unresolved.is_empty() {
        println!("  (none)");
    }
    for resolved in &report.resolved {
        println!("  {} {}", "✓".green(), resolved);
    }
    for dep in &report.unresolved {
        println!("  {} {} {}", "✗".red(), dep, "(unresolved)".red());
    }

    Ok(())
}
