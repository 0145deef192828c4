//! Read-only queries of the wrapped package manager

use crate::error::Result;
use crate::types::{EnvironmentState, ObservedState, PackageIdentity};
use pkgkit::{Backend, ErrorCategory, PackageRef};

/// Observes installed state through a backend. Never mutates the host.
pub struct Inspector<'a> {
    backend: &'a dyn Backend,
}

impl<'a> Inspector<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Observe one package, optionally inside an environment.
    ///
    /// A package the tool does not know is reported with `exists == false`
    /// rather than as an error.
    pub fn observe(
        &self,
        identity: &PackageIdentity,
        environment: Option<&str>,
    ) -> Result<ObservedState> {
        let package = PackageRef::new(identity.name()).in_environment(environment);
        let exclusive_versions = self.backend.exclusive_versions();

        let Some(info) = self.backend.info(&package)? else {
            log::debug!("{package}: unknown to {}", self.backend.tool());
            return Ok(ObservedState {
                exclusive_versions,
                ..ObservedState::unknown()
            });
        };

        let installed_versions = info.installed_versions.into_iter().collect();
        let observed = ObservedState {
            installed_versions,
            active_version: info.linked_version,
            exists: true,
            available_version: info.latest_version,
            exclusive_versions,
        };
        log::debug!(
            "{package}: installed {:?}, active {:?}, available {:?}",
            observed.installed_versions,
            observed.active_version,
            observed.available_version
        );
        Ok(observed)
    }

    /// Observe a named environment.
    pub fn observe_environment(&self, name: &str) -> Result<EnvironmentState> {
        let exists = self.backend.list_environments()?.iter().any(|e| e == name);
        let packages = if exists {
            match self.backend.environment_packages(name) {
                Ok(packages) => packages,
                // removed between the two queries
                Err(e) if e.category() == ErrorCategory::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
            }
        } else {
            Vec::new()
        };

        Ok(EnvironmentState {
            name: name.to_string(),
            exists,
            packages,
        })
    }
}
