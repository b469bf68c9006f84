//! List command implementation

use anyhow::Result;
use colored::Colorize;

use vltpkg::config::Config;
use vltpkg::package::PackageStatus;

pub fn run(installed: bool, filter: Option<&str>, config: &Config) -> Result<()> {
    let registry = config.open_registry()?;

    let mut shown = 0;
    for id in registry.packages()? {
        let Some(pkg) = registry.open(&id)? else {
            continue;
        };
        if installed && !pkg.is_installed() {
            continue;
        }
        let name = id.to_string();
        if filter.is_some_and(|f| !name.contains(f)) {
            continue;
        }

        let status = match pkg.status() {
            PackageStatus::Registered => pkg.status().to_string().normal(),
            PackageStatus::Extracted => pkg.status().to_string().cyan(),
            PackageStatus::Installed => pkg.status().to_string().green(),
        };
        println!("  {:<50} {}", name.bold(), status);
        shown += 1;
    }

    if shown == 0 {
        println!("  (no packages)");
    }
    if let Some(f) = filter {
        println!("  Filter: {}", f.cyan());
    }

    Ok(())
}
