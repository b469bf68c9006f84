//! Extract and uninstall command implementations

use anyhow::Result;
use colored::Colorize;

use vltpkg::config::Config;
use vltpkg::options::ImportOptions;
use vltpkg::plan::ExecutionPlanBuilder;
use vltpkg::registry::RegisteredPackage;
use vltpkg::resolver;

pub fn run_extract(packages: &[String], options: &ImportOptions, config: &Config) -> Result<()> {
    let registry = config.open_registry()?;

    let mut items: Vec<RegisteredPackage> = Vec::new();
    for package in packages {
        let id = super::registered_id(registry.as_ref(), package)?;
        if let Some(pkg) = registry.open(&id)? {
            items.push(pkg);
        }
    }

    let mut builder = ExecutionPlanBuilder::new();
    for pkg in resolver::sort(items)? {
        builder.extract(pkg.id().clone(), options.clone());
    }

    if options.dry_run {
        println!("{}", "Dry run mode - no changes will be made".yellow());
    }
    println!(
        "{} {} package(s) into {}",
        "Extracting".cyan(),
        builder.tasks().len(),
        config.target.root.display()
    );
    super::run_plan(&mut builder.build(), registry.as_ref(), config)
}

pub fn run_uninstall(packages: &[String], options: &ImportOptions, config: &Config) -> Result<()> {
    let registry = config.open_registry()?;

    let mut builder = ExecutionPlanBuilder::new();
    for package in packages {
        let id = super::registered_id(registry.as_ref(), package)?;
        builder.uninstall(id, options.clone());
    }

    if options.dry_run {
        println!("{}", "Dry run mode - no changes will be made".yellow());
    }
    println!(
        "{} {} package(s) from {}",
        "Uninstalling".cyan(),
        builder.tasks().len(),
        config.target.root.display()
    );
    super::run_plan(&mut builder.build(), registry.as_ref(), config)
}
