//! Info command implementation

use anyhow::Result;
use colored::Colorize;

use vltpkg::config::Config;
use vltpkg::dependency::Dependency;

pub fn run(package: &str, config: &Config) -> Result<()> {
    let registry = config.open_registry()?;
    let id = super::parse_id(package)?;
    let Some(pkg) = registry.open(&id)? else {
        return Err(vltpkg::Error::NoSuchPackage(id).into());
    };

    println!("{}: {}", "Package".bold(), id.to_string().cyan());
    println!("  Group:    {}", id.group());
    println!("  Name:     {}", id.name());
    println!("  Version:  {}", id.version());
    println!("  Status:   {}", pkg.status());
    println!("  File:     {}{}", pkg.file().display(), if pkg.is_external() { " (external)" } else { "" });
    println!("  Size:     {}", super::format_bytes(pkg.size()));
    if let Some(at) = pkg.installed_at() {
        println!("  Applied:  {}", at.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(filter) = pkg.filter() {
        println!("  Filter:   {}", filter.roots.join(", "));
    }
    match pkg.properties() {
        Ok(props) => {
            if let Some(description) = props.description {
                println!("  About:    {}", description);
            }
        }
        Err(e) => tracing::warn!("Cannot read package file of {}: {}", id, e),
    }

    println!();
    println!("{}", "Dependencies:".bold());
    if pkg.dependencies().is_empty() {
        println!("  (none)");
    } else {
        println!("  {}", Dependency::format_list(pkg.dependencies()));
    }

    if !pkg.sub_packages().is_empty() {
        println!();
        println!("{}", "Sub-packages:".bold());
        for (sub, option) in pkg.sub_packages() {
            println!("  {} ({})", sub, option);
        }
    }

    Ok(())
}
