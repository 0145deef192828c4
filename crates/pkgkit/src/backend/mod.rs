//! Backend abstraction for package manager operations.
//!
//! The [`Backend`] trait defines the interface for querying and driving a
//! wrapped package manager, allowing for different implementations (real
//! CLIs, an in-memory mock for testing).

pub mod brew;
pub mod conda;
pub mod mock;

use crate::error::{Error, Result};
use crate::types::{PackageInfo, PackageRef, Tool, ToolOptions, UpdateOutcome};

/// Backend trait for package manager operations.
///
/// Query methods never mutate the tool's state. Mutating methods map
/// one-to-one onto reconciliation actions.
pub trait Backend: Send + Sync {
    /// Which package manager this backend drives.
    fn tool(&self) -> Tool;

    /// Check if the package manager is usable.
    fn is_available(&self) -> bool;

    /// Whether the tool keeps at most one version of a package per namespace,
    /// so installing a version implicitly replaces the active one.
    fn exclusive_versions(&self) -> bool {
        false
    }

    /// Query a package. Returns `None` when the tool knows nothing about it.
    fn info(&self, package: &PackageRef) -> Result<Option<PackageInfo>>;

    /// Install a package, optionally at a version and from a recipe/channel.
    fn install(&self, package: &PackageRef, version: Option<&str>, recipe: Option<&str>)
    -> Result<()>;

    /// Remove one installed version of a package.
    fn uninstall(&self, package: &PackageRef, version: &str) -> Result<()>;

    /// Make an installed version the active one.
    fn link(&self, package: &PackageRef, version: &str) -> Result<()>;

    /// Stop exposing a version without removing it.
    fn unlink(&self, package: &PackageRef, version: &str) -> Result<()>;

    /// Build or refresh the package from the head of its source.
    fn fetch_head(&self, package: &PackageRef) -> Result<()>;

    /// Upgrade a package to the newest version its recipe declares.
    fn upgrade(&self, package: &PackageRef) -> Result<()>;

    /// Refresh the package manager itself and its definitions.
    fn update(&self) -> Result<UpdateOutcome>;

    /// Upgrade every installed package.
    fn upgrade_all(&self) -> Result<UpdateOutcome>;

    /// List environment names.
    fn list_environments(&self) -> Result<Vec<String>> {
        Err(self.unsupported("environments"))
    }

    /// List package names installed in an environment.
    fn environment_packages(&self, _name: &str) -> Result<Vec<String>> {
        Err(self.unsupported("environments"))
    }

    /// Create an empty environment.
    fn create_environment(&self, _name: &str) -> Result<()> {
        Err(self.unsupported("environment creation"))
    }

    /// Remove an environment and everything installed in it.
    fn remove_environment(&self, _name: &str) -> Result<()> {
        Err(self.unsupported("environment removal"))
    }

    /// Build an `Unsupported` error for this backend.
    fn unsupported(&self, operation: &str) -> Error {
        Error::Unsupported {
            tool: self.tool(),
            operation: operation.to_string(),
        }
    }
}

/// Create the real CLI backend for a tool.
pub fn for_tool(tool: Tool, options: &ToolOptions) -> Result<Box<dyn Backend>> {
    Ok(match tool {
        Tool::Brew => Box::new(brew::BrewBackend::new(options)?),
        Tool::Conda => Box::new(conda::CondaBackend::new(options)?),
    })
}
