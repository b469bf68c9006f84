//! Plan command implementations

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use colored::Colorize;

use vltpkg::config::Config;
use vltpkg::options::ImportOptions;
use vltpkg::plan::{ExecutionPlanBuilder, TaskType};

/// Parse a `TYPE=ID` task argument
fn parse_task(s: &str) -> Result<(TaskType, vltpkg::PackageId)> {
    let (task_type, id) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid task '{}', expected TYPE=ID", s))?;
    let task_type: TaskType = task_type.trim().parse().map_err(|e: String| anyhow!(e))?;
    Ok((task_type, super::parse_id(id)?))
}

pub fn save(output: &Path, tasks: &[String], options: &ImportOptions) -> Result<()> {
    let mut builder = ExecutionPlanBuilder::new();
    for task in tasks {
        let (task_type, id) = parse_task(task)?;
        let options = match task_type {
            TaskType::Add | TaskType::Remove => ImportOptions::default(),
            _ => options.clone(),
        };
        builder.add_task(id, task_type, options);
    }

    let file = File::create(output)
        .with_context(|| format!("Failed to create plan file: {}", output.display()))?;
    let mut writer = BufWriter::new(file);
    builder.save(&mut writer)?;
    writer.flush()?;

    println!(
        "  {} Saved {} task(s) to {}",
        "✓".green(),
        builder.tasks().len(),
        output.display()
    );
    Ok(())
}

pub fn run(file: &Path, config: &Config) -> Result<()> {
    let reader = File::open(file)
        .with_context(|| format!("Failed to open plan file: {}", file.display()))?;
    let builder = ExecutionPlanBuilder::load(BufReader::new(reader))
        .with_context(|| format!("Failed to read plan file: {}", file.display()))?;

    let registry = config.open_registry()?;
    println!(
        "{} {} task(s) from {}",
        "Running".cyan(),
        builder.tasks().len(),
        file.display()
    );
    super::run_plan(&mut builder.build(), registry.as_ref(), config)
}
