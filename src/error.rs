//! Error types for vltpkg

use thiserror::Error;

use crate::dependency::Dependency;
use crate::package::PackageId;
use crate::plan::TaskType;

/// Main error type for vltpkg operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Package has cyclic dependencies: {0}")]
    CyclicDependency(PackageId),

    #[error("Package already exists: {0}")]
    PackageExists(PackageId),

    #[error("No such package: {0}")]
    NoSuchPackage(PackageId),

    #[error("Package {id} has unsatisfied dependencies: {}", Dependency::format_list(.unresolved))]
    DependencyUnsatisfied {
        id: PackageId,
        unresolved: Vec<Dependency>,
    },

    #[error("Task {task_type} is not supported for package {id}")]
    UnsupportedTask { id: PackageId, task_type: TaskType },

    #[error("Invalid version range: {0}")]
    InvalidRange(String),

    #[error("Invalid package: {0}")]
    InvalidPackage(String),

    #[error("Invalid registry metadata: {0}")]
    Metadata(String),

    #[error("Registry configuration error: {0}")]
    Config(String),

    #[error("Execution plan has already been executed")]
    PlanAlreadyExecuted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for vltpkg operations
pub type Result<T> = std::result::Result<T, Error>;
