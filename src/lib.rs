//! vltpkg - content package registry
//!
//! Identifies content packages, resolves their dependencies, keeps track of
//! what is registered and extracted, and runs ordered execution plans.

pub mod archive;
pub mod config;
pub mod dependency;
pub mod error;
pub mod extract;
pub mod options;
pub mod package;
pub mod plan;
pub mod registry;
pub mod resolver;
pub mod version;

mod xml;

pub use dependency::Dependency;
pub use error::{Error, Result};
pub use package::{PackageId, PackageStatus};
pub use plan::{ExecutionPlan, ExecutionPlanBuilder, TaskType};
pub use registry::PackageRegistry;
pub use version::{Version, VersionRange};
