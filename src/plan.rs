//! Execution plans
//!
//! A plan is an ordered list of package tasks. It is validated as a whole
//! against a registry right before it runs, then every task runs in order.
//! A failing task is recorded on the task and does not stop the plan.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::archive::PackageArchiveReader;
use crate::dependency::Dependency;
use crate::error::{Error, Result};
use crate::extract::ContentExtractor;
use crate::options::ImportOptions;
use crate::package::{PackageId, PackageStatus, SubPackageHandling, SubPackageOption};
use crate::registry::PackageRegistry;

/// What a task does with its package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Extract content and run installation steps
    Install,
    /// Extract content only
    Extract,
    /// Remove previously extracted content
    Uninstall,
    /// Keep the package registered without touching content
    Add,
    /// Unregister the package
    Remove,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskType::Install => write!(f, "INSTALL"),
            TaskType::Extract => write!(f, "EXTRACT"),
            TaskType::Uninstall => write!(f, "UNINSTALL"),
            TaskType::Add => write!(f, "ADD"),
            TaskType::Remove => write!(f, "REMOVE"),
        }
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "install" => Ok(TaskType::Install),
            "extract" => Ok(TaskType::Extract),
            "uninstall" => Ok(TaskType::Uninstall),
            "add" => Ok(TaskType::Add),
            "remove" => Ok(TaskType::Remove),
            _ => Err(format!("Unknown task type: {}", s)),
        }
    }
}

/// Task state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TaskState {
    /// Not run yet
    #[default]
    New,
    /// Ran successfully
    Completed,
    /// Ran and failed
    Error,
}

/// A single step of a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: PackageId,
    #[serde(rename = "type")]
    task_type: TaskType,
    #[serde(default)]
    options: ImportOptions,
    #[serde(skip)]
    state: TaskState,
    #[serde(skip)]
    error: Option<String>,
}

impl Task {
    pub fn new(id: PackageId, task_type: TaskType, options: ImportOptions) -> Self {
        Self {
            id,
            task_type,
            options,
            state: TaskState::New,
            error: None,
        }
    }

    pub fn id(&self) -> &PackageId {
        &self.id
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn options(&self) -> &ImportOptions {
        &self.options
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    /// Failure message of a task in [`TaskState::Error`]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn finish(&mut self, result: Result<()>) {
        match result {
            Ok(()) => {
                self.state = TaskState::Completed;
                tracing::info!("{} {} completed", self.task_type, self.id);
            }
            Err(e) => {
                tracing::error!("{} {} failed: {}", self.task_type, self.id, e);
                self.state = TaskState::Error;
                self.error = Some(e.to_string());
            }
        }
    }
}

/// Collects tasks for an [`ExecutionPlan`]
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlanBuilder {
    tasks: Vec<Task>,
}

impl ExecutionPlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a task. Nothing is checked until the plan runs.
    pub fn add_task(&mut self, id: PackageId, task_type: TaskType, options: ImportOptions) -> &mut Self {
        self.tasks.push(Task::new(id, task_type, options));
        self
    }

    pub fn install(&mut self, id: PackageId, options: ImportOptions) -> &mut Self {
        self.add_task(id, TaskType::Install, options)
    }

    pub fn extract(&mut self, id: PackageId, options: ImportOptions) -> &mut Self {
        self.add_task(id, TaskType::Extract, options)
    }

    pub fn uninstall(&mut self, id: PackageId, options: ImportOptions) -> &mut Self {
        self.add_task(id, TaskType::Uninstall, options)
    }

    pub fn add(&mut self, id: PackageId) -> &mut Self {
        self.add_task(id, TaskType::Add, ImportOptions::default())
    }

    pub fn remove(&mut self, id: PackageId) -> &mut Self {
        self.add_task(id, TaskType::Remove, ImportOptions::default())
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Write the tasks as JSON
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, &self.tasks)?;
        Ok(())
    }

    /// Read tasks written by [`save`](Self::save)
    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let tasks: Vec<Task> = serde_json::from_reader(reader)?;
        Ok(Self { tasks })
    }

    pub fn build(&self) -> ExecutionPlan {
        ExecutionPlan {
            tasks: self.tasks.clone(),
            executed: false,
        }
    }
}

/// An ordered list of tasks that runs once
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    tasks: Vec<Task>,
    executed: bool,
}

impl ExecutionPlan {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn has_errors(&self) -> bool {
        self.tasks.iter().any(|t| t.state == TaskState::Error)
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    /// Validate and run the plan
    pub fn execute(
        &mut self,
        registry: &dyn PackageRegistry,
        extractor: &dyn ContentExtractor,
    ) -> Result<()> {
        self.execute_with_progress(registry, extractor, |_| {})
    }

    /// Validate and run the plan, calling `progress` after every task
    pub fn execute_with_progress<F>(
        &mut self,
        registry: &dyn PackageRegistry,
        extractor: &dyn ContentExtractor,
        mut progress: F,
    ) -> Result<()>
    where
        F: FnMut(&Task),
    {
        if self.executed {
            return Err(Error::PlanAlreadyExecuted);
        }
        self.validate(registry)?;
        self.executed = true;

        tracing::info!("Executing plan with {} tasks", self.tasks.len());
        for task in &mut self.tasks {
            let result = run_task(task, registry, extractor);
            task.finish(result);
            progress(task);
        }
        Ok(())
    }

    fn validate(&self, registry: &dyn PackageRegistry) -> Result<()> {
        let mut earlier: Vec<&PackageId> = Vec::new();
        for task in &self.tasks {
            if !registry.contains(&task.id)? {
                return Err(Error::NoSuchPackage(task.id.clone()));
            }
            if matches!(task.task_type, TaskType::Install | TaskType::Extract) {
                let report = registry.analyze_dependencies(&task.id, false)?;
                let unresolved: Vec<Dependency> = report
                    .unresolved
                    .into_iter()
                    .filter(|dep| !earlier.iter().any(|id| dep.matches(id)))
                    .collect();
                if !unresolved.is_empty() {
                    return Err(Error::DependencyUnsatisfied {
                        id: task.id.clone(),
                        unresolved,
                    });
                }
            }
            earlier.push(&task.id);
        }
        Ok(())
    }
}

fn run_task(
    task: &Task,
    registry: &dyn PackageRegistry,
    extractor: &dyn ContentExtractor,
) -> Result<()> {
    let id = &task.id;
    let options = &task.options;
    tracing::debug!("Running {} {}", task.task_type, id);

    if task.task_type == TaskType::Remove {
        if options.dry_run {
            tracing::info!("Would remove {}", id);
            return Ok(());
        }
        return registry.remove(id);
    }

    let package = registry
        .open(id)?
        .ok_or_else(|| Error::NoSuchPackage(id.clone()))?;

    let status = match task.task_type {
        TaskType::Install => {
            extractor.install(&package, options)?;
            Some(PackageStatus::Installed)
        }
        TaskType::Extract => {
            extractor.extract(&package, options)?;
            Some(PackageStatus::Extracted)
        }
        TaskType::Uninstall => {
            extractor.uninstall(&package, options)?;
            Some(PackageStatus::Registered)
        }
        TaskType::Add | TaskType::Remove => None,
    };

    if options.dry_run {
        return Ok(());
    }
    let Some(status) = status else {
        return Ok(());
    };
    // in strict mode a failed sub-package leaves the parent status untouched
    if status.is_installed() {
        match process_sub_packages(id, options, registry, extractor) {
            Err(e) if !options.strict => {
                tracing::warn!("Sub-packages of {} not fully processed: {}", id, e)
            }
            other => other?,
        }
    }
    registry.set_status(id, status)
}

/// Register the packages embedded in `id` and handle each one according to
/// the task's sub-package rules
fn process_sub_packages(
    id: &PackageId,
    options: &ImportOptions,
    registry: &dyn PackageRegistry,
    extractor: &dyn ContentExtractor,
) -> Result<()> {
    let package = registry
        .open(id)?
        .ok_or_else(|| Error::NoSuchPackage(id.clone()))?;
    let dir = tempfile::tempdir()?;
    let files = package.reader()?.unpack_sub_packages(dir.path())?;
    if files.is_empty() {
        return Ok(());
    }

    let handling: &SubPackageHandling = &options.sub_packages;
    let sub_options = ImportOptions {
        filter: None,
        ..options.clone()
    };

    let mut handled = BTreeMap::new();
    for file in files {
        let sub_id = PackageArchiveReader::open(&file)?.read_properties()?.id;
        let option = handling.option_for(&sub_id);
        tracing::info!("Sub-package {} of {}: {}", sub_id, id, option);

        if option != SubPackageOption::Ignore {
            if !registry.contains(&sub_id)? {
                registry.register(&mut File::open(&file)?, false)?;
            }
            if matches!(option, SubPackageOption::Install | SubPackageOption::Extract) {
                let sub = registry
                    .open(&sub_id)?
                    .ok_or_else(|| Error::NoSuchPackage(sub_id.clone()))?;
                extractor.extract(&sub, &sub_options)?;
                registry.set_status(&sub_id, PackageStatus::Extracted)?;
                process_sub_packages(&sub_id, &sub_options, registry, extractor)?;
            }
        }
        handled.insert(sub_id, option);
    }

    registry.record_sub_packages(id, &handled)
}
