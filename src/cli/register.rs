//! Register command implementation

use std::fs::File;
use std::path::PathBuf;

use anyhow::{bail, Result};
use colored::Colorize;

use vltpkg::config::Config;
use vltpkg::Error;

pub fn run(files: &[PathBuf], replace: bool, external: bool, config: &Config) -> Result<()> {
    let registry = config.open_registry()?;

    let mut failed = 0;
    for path in files {
        let result = if external {
            registry.register_external(path, replace)
        } else {
            File::open(path)
                .map_err(Error::from)
                .and_then(|mut file| registry.register(&mut file, replace))
        };

        match result {
            Ok(id) => println!("  {} {}", "✓".green(), id.to_string().bold()),
            Err(Error::PackageExists(id)) => {
                failed += 1;
                println!(
                    "  {} {} {}",
                    "✗".red(),
                    id.to_string().bold(),
                    "(already registered, use --replace)".yellow()
                );
            }
            Err(e) => {
                failed += 1;
                println!("  {} {}: {}", "✗".red(), path.display(), e.to_string().red());
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} package(s) not registered", failed, files.len());
    }
    Ok(())
}
