//! Command-line interface for vltpkg

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Subcommand;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use vltpkg::config::Config;
use vltpkg::options::{ImportMode, ImportOptions, PathFilter};
use vltpkg::package::{PackageId, SubPackageHandling};
use vltpkg::plan::{ExecutionPlan, TaskState};
use vltpkg::registry::PackageRegistry;

mod depends;
mod extract;
mod info;
mod list;
mod plan;
mod register;
mod remove;
mod sort;

#[derive(Subcommand)]
pub enum Commands {
    /// Register package files
    Register {
        /// Package file(s) to register
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Replace packages that are already registered
        #[arg(long)]
        replace: bool,

        /// Reference the files in place instead of copying them
        #[arg(long)]
        external: bool,
    },

    /// Unregister packages
    Remove {
        /// Package id(s), e.g. my/group:site:1.0
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// List registered packages
    List {
        /// Only show extracted or installed packages
        #[arg(long)]
        installed: bool,

        /// Filter by pattern
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Show package information
    Info {
        /// Package id
        package: String,
    },

    /// Show the dependencies of a package
    Depends {
        /// Package id
        package: String,

        /// Show reverse dependencies (what depends on this)
        #[arg(long)]
        reverse: bool,

        /// Only resolve against extracted or installed packages
        #[arg(long)]
        installed: bool,
    },

    /// Print packages in dependency order
    Sort {
        /// Package ids (all registered packages if none given)
        packages: Vec<String>,
    },

    /// Extract package content into the target directory
    Extract {
        /// Package id(s), extracted in dependency order
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        options: TaskArgs,
    },

    /// Remove package content from the target directory
    Uninstall {
        /// Package id(s)
        #[arg(required = true)]
        packages: Vec<String>,

        #[command(flatten)]
        options: TaskArgs,
    },

    /// Execution plan commands
    #[command(subcommand)]
    Plan(PlanCommands),
}

/// Execution plan subcommands
#[derive(Subcommand)]
pub enum PlanCommands {
    /// Write a plan file
    Save {
        /// Output file
        output: PathBuf,

        /// Tasks as TYPE=ID, e.g. extract=my/group:site:1.0
        #[arg(required = true)]
        tasks: Vec<String>,

        #[command(flatten)]
        options: TaskArgs,
    },

    /// Run a plan file
    Run {
        /// Plan file written by `plan save`
        file: PathBuf,
    },
}

/// Options shared by commands that create tasks
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TaskArgs {
    /// Don't actually change anything, just show what would happen
    #[arg(long)]
    dry_run: bool,

    /// Fail the task when a sub-package cannot be handled
    #[arg(long)]
    strict: bool,

    /// How existing files are treated: replace, merge or update
    #[arg(long, value_parser = parse_mode, default_value = "replace")]
    mode: ImportMode,

    /// Only touch content below these repository paths
    #[arg(long = "path")]
    paths: Vec<String>,

    /// Sub-package rules, e.g. "my/group:*;extract,*:*;ignore"
    #[arg(long)]
    sub_packages: Option<String>,
}

impl TaskArgs {
    fn to_options(&self) -> ImportOptions {
        let mut options = ImportOptions::new()
            .dry_run(self.dry_run)
            .strict(self.strict)
            .import_mode(self.mode);
        if !self.paths.is_empty() {
            options = options.filter(PathFilter::new(self.paths.iter().cloned()));
        }
        if let Some(rules) = &self.sub_packages {
            options = options.sub_packages(SubPackageHandling::parse(rules));
        }
        options
    }
}

fn parse_mode(s: &str) -> std::result::Result<ImportMode, String> {
    match s.to_ascii_lowercase().as_str() {
        "replace" => Ok(ImportMode::Replace),
        "merge" => Ok(ImportMode::Merge),
        "update" => Ok(ImportMode::Update),
        _ => Err(format!("unknown import mode '{}'", s)),
    }
}

/// Execute a CLI command
pub fn execute(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Register { files, replace, external } => {
            register::run(&files, replace, external, config)
        }
        Commands::Remove { packages } => {
            remove::run(&packages, config)
        }
        Commands::List { installed, filter } => {
            list::run(installed, filter.as_deref(), config)
        }
        Commands::Info { package } => {
            info::run(&package, config)
        }
        Commands::Depends { package, reverse, installed } => {
            depends::run(&package, reverse, installed, config)
        }
        Commands::Sort { packages } => {
            sort::run(&packages, config)
        }
        Commands::Extract { packages, options } => {
            extract::run_extract(&packages, &options.to_options(), config)
        }
        Commands::Uninstall { packages, options } => {
            extract::run_uninstall(&packages, &options.to_options(), config)
        }
        Commands::Plan(subcmd) => match subcmd {
            PlanCommands::Save { output, tasks, options } => {
                plan::save(&output, &tasks, &options.to_options())
            }
            PlanCommands::Run { file } => {
                plan::run(&file, config)
            }
        },
    }
}

/// Parse a package id argument
fn parse_id(s: &str) -> Result<PackageId> {
    PackageId::parse(s.trim()).ok_or_else(|| anyhow!("Invalid package id: '{}'", s))
}

/// Parse a package id argument and make sure it is registered
fn registered_id(registry: &dyn PackageRegistry, s: &str) -> Result<PackageId> {
    let id = parse_id(s)?;
    if !registry.contains(&id)? {
        return Err(vltpkg::Error::NoSuchPackage(id).into());
    }
    Ok(id)
}

/// Run a plan with a progress bar and print the outcome of every task
fn run_plan(plan: &mut ExecutionPlan, registry: &dyn PackageRegistry, config: &Config) -> Result<()> {
    let extractor = config.extractor();

    let pb = ProgressBar::new(plan.tasks().len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );

    let result = plan.execute_with_progress(registry, &extractor, |task| {
        pb.set_message(format!("{} {}", task.task_type(), task.id()));
        pb.inc(1);
    });
    pb.finish_and_clear();
    result.context("Plan was not executed")?;

    for task in plan.tasks() {
        match task.state() {
            TaskState::Completed => println!(
                "  {} {} {}",
                "✓".green(),
                task.task_type(),
                task.id().to_string().bold()
            ),
            TaskState::Error => println!(
                "  {} {} {}: {}",
                "✗".red(),
                task.task_type(),
                task.id().to_string().bold(),
                task.error().unwrap_or("unknown error").red()
            ),
            TaskState::New => println!(
                "  {} {} {}",
                "-".dimmed(),
                task.task_type(),
                task.id()
            ),
        }
    }

    if plan.has_errors() {
        let failed = plan
            .tasks()
            .iter()
            .filter(|t| t.state() == TaskState::Error)
            .count();
        return Err(anyhow!("{} of {} task(s) failed", failed, plan.tasks().len()));
    }
    Ok(())
}

/// Format bytes as human-readable size
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
