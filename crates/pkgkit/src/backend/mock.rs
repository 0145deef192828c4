//! In-memory backend for tests.

use crate::backend::Backend;
use crate::error::{Error, Result};
use crate::types::{PackageInfo, PackageRef, Tool, UpdateOutcome};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (Option<String>, String);

#[derive(Debug, Default, Clone)]
struct MockPackage {
    installed: BTreeSet<String>,
    linked: Option<String>,
}

#[derive(Debug, Default)]
struct MockState {
    packages: BTreeMap<Key, MockPackage>,
    registry: HashMap<String, String>,
    environments: BTreeSet<String>,
    failures: HashMap<String, String>,
    calls: Vec<String>,
    up_to_date: bool,
}

/// Mock backend for testing without a real package manager.
///
/// Holds installed versions, linked versions and a registry of latest
/// versions in memory. Any operation can be made to fail with a given
/// diagnostic, and every mutating call is recorded.
#[derive(Debug, Clone)]
pub struct MockBackend {
    tool: Tool,
    exclusive: bool,
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Tool::Brew)
    }
}

impl MockBackend {
    /// Create an empty mock for a tool.
    ///
    /// Conda mocks keep one version per package, like the real tool.
    #[must_use]
    pub fn new(tool: Tool) -> Self {
        Self {
            tool,
            exclusive: tool == Tool::Conda,
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the newest version the registry offers for a package.
    #[must_use]
    pub fn with_available(self, name: &str, version: &str) -> Self {
        self.state()
            .registry
            .insert(name.to_string(), version.to_string());
        self
    }

    /// Mark versions as installed, in the default namespace.
    #[must_use]
    pub fn with_installed(self, name: &str, versions: &[&str]) -> Self {
        self.with_installed_in(None, name, versions)
    }

    /// Mark versions as installed in an environment.
    #[must_use]
    pub fn with_installed_in(self, env: Option<&str>, name: &str, versions: &[&str]) -> Self {
        {
            let mut state = self.state();
            if let Some(env) = env {
                state.environments.insert(env.to_string());
            }
            let pkg = state
                .packages
                .entry((env.map(str::to_string), name.to_string()))
                .or_default();
            pkg.installed
                .extend(versions.iter().map(|v| (*v).to_string()));
            if self.exclusive {
                pkg.linked = pkg.installed.iter().next_back().cloned();
            }
        }
        self
    }

    /// Set the linked version of an installed package.
    #[must_use]
    pub fn with_linked(self, name: &str, version: &str) -> Self {
        if let Some(pkg) = self.state().packages.get_mut(&(None, name.to_string())) {
            pkg.linked = Some(version.to_string());
        }
        self
    }

    /// Create an empty environment.
    #[must_use]
    pub fn with_environment(self, name: &str) -> Self {
        self.state().environments.insert(name.to_string());
        self
    }

    /// Report the tool as already up to date on `update`.
    #[must_use]
    pub fn up_to_date(self) -> Self {
        self.state().up_to_date = true;
        self
    }

    /// Make an operation fail with the given tool output.
    ///
    /// Operation names match the [`Backend`] method names.
    pub fn fail_on(&self, operation: &str, stderr: &str) {
        self.state()
            .failures
            .insert(operation.to_string(), stderr.to_string());
    }

    /// Every mutating call made so far, as `operation target` strings.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    /// Installed versions of a package.
    pub fn installed(&self, package: &PackageRef) -> BTreeSet<String> {
        self.state()
            .packages
            .get(&key(package))
            .map(|p| p.installed.clone())
            .unwrap_or_default()
    }

    /// Linked version of a package.
    pub fn linked(&self, package: &PackageRef) -> Option<String> {
        self.state()
            .packages
            .get(&key(package))
            .and_then(|p| p.linked.clone())
    }

    fn record(&self, operation: &str, target: &str, package: Option<&str>) -> Result<()> {
        let mut state = self.state();
        state.calls.push(format!("{operation} {target}"));
        match state.failures.get(operation) {
            Some(stderr) => Err(Error::from_tool_output(self.tool, stderr, package)),
            None => Ok(()),
        }
    }

    fn with_package<T>(
        &self,
        package: &PackageRef,
        f: impl FnOnce(&mut MockPackage) -> T,
    ) -> T {
        let mut state = self.state();
        f(state.packages.entry(key(package)).or_default())
    }

    fn require_environment(&self, package: &PackageRef) -> Result<()> {
        match &package.environment {
            Some(_) if self.tool == Tool::Brew => Err(self.unsupported("environments")),
            _ => Ok(()),
        }
    }
}

fn key(package: &PackageRef) -> Key {
    (package.environment.clone(), package.name.clone())
}

impl Backend for MockBackend {
    fn tool(&self) -> Tool {
        self.tool
    }

    fn is_available(&self) -> bool {
        true
    }

    fn exclusive_versions(&self) -> bool {
        self.exclusive
    }

    fn info(&self, package: &PackageRef) -> Result<Option<PackageInfo>> {
        self.require_environment(package)?;
        let state = self.state();
        if let Some(stderr) = state.failures.get("info") {
            return Err(Error::from_tool_output(self.tool, stderr, Some(&package.name)));
        }

        let pkg = state.packages.get(&key(package)).cloned().unwrap_or_default();
        let latest = state.registry.get(&package.name).cloned();
        if pkg.installed.is_empty() && latest.is_none() {
            return Ok(None);
        }

        Ok(Some(PackageInfo {
            name: package.name.clone(),
            installed_versions: pkg.installed.into_iter().collect(),
            linked_version: pkg.linked,
            latest_version: latest,
        }))
    }

    fn install(
        &self,
        package: &PackageRef,
        version: Option<&str>,
        recipe: Option<&str>,
    ) -> Result<()> {
        self.require_environment(package)?;
        self.record("install", &package.to_string(), Some(&package.name))?;

        let latest = self.state().registry.get(&package.name).cloned();
        let version = version
            .map(str::to_string)
            .or(latest)
            .or_else(|| recipe.map(|_| "recipe".to_string()))
            .ok_or_else(|| Error::NotFound {
                name: package.name.clone(),
                stderr: format!("No available formula with the name \"{}\"", package.name),
            })?;

        let exclusive = self.exclusive;
        self.with_package(package, |pkg| {
            if exclusive {
                pkg.installed.clear();
            }
            pkg.installed.insert(version.clone());
            pkg.linked = Some(version);
        });
        Ok(())
    }

    fn uninstall(&self, package: &PackageRef, version: &str) -> Result<()> {
        self.require_environment(package)?;
        self.record("uninstall", &format!("{package}@{version}"), Some(&package.name))?;
        self.with_package(package, |pkg| {
            pkg.installed.remove(version);
            if pkg.linked.as_deref() == Some(version) {
                pkg.linked = None;
            }
        });
        Ok(())
    }

    fn link(&self, package: &PackageRef, version: &str) -> Result<()> {
        self.require_environment(package)?;
        if self.exclusive {
            return Err(self.unsupported("link"));
        }
        self.record("link", &format!("{package}@{version}"), Some(&package.name))?;
        self.with_package(package, |pkg| {
            if pkg.installed.contains(version) {
                pkg.linked = Some(version.to_string());
                Ok(())
            } else {
                Err(Error::NotFound {
                    name: format!("{}/{}", package.name, version),
                    stderr: String::new(),
                })
            }
        })
    }

    fn unlink(&self, package: &PackageRef, version: &str) -> Result<()> {
        self.require_environment(package)?;
        if self.exclusive {
            return Err(self.unsupported("unlink"));
        }
        self.record("unlink", &format!("{package}@{version}"), Some(&package.name))?;
        self.with_package(package, |pkg| {
            if pkg.linked.as_deref() == Some(version) {
                pkg.linked = None;
            }
        });
        Ok(())
    }

    fn fetch_head(&self, package: &PackageRef) -> Result<()> {
        self.require_environment(package)?;
        if self.exclusive {
            return Err(self.unsupported("head installs"));
        }
        self.record("fetch_head", &package.to_string(), Some(&package.name))?;
        self.with_package(package, |pkg| {
            pkg.installed.insert("HEAD".to_string());
            pkg.linked = Some("HEAD".to_string());
        });
        Ok(())
    }

    fn upgrade(&self, package: &PackageRef) -> Result<()> {
        self.require_environment(package)?;
        self.record("upgrade", &package.to_string(), Some(&package.name))?;
        let Some(latest) = self.state().registry.get(&package.name).cloned() else {
            return Ok(());
        };
        let exclusive = self.exclusive;
        self.with_package(package, |pkg| {
            if exclusive {
                pkg.installed.clear();
            }
            pkg.installed.insert(latest.clone());
            pkg.linked = Some(latest);
        });
        Ok(())
    }

    fn update(&self) -> Result<UpdateOutcome> {
        self.record("update", self.tool.executable(), None)?;
        if self.state().up_to_date {
            Ok(UpdateOutcome::AlreadyUpToDate)
        } else {
            Ok(UpdateOutcome::Updated)
        }
    }

    fn upgrade_all(&self) -> Result<UpdateOutcome> {
        self.record("upgrade_all", self.tool.executable(), None)?;
        let mut state = self.state();
        let registry = state.registry.clone();
        let exclusive = self.exclusive;
        let mut upgraded = false;
        for ((_, name), pkg) in &mut state.packages {
            if pkg.installed.is_empty() {
                continue;
            }
            let Some(latest) = registry.get(name) else {
                continue;
            };
            if pkg.linked.as_ref() == Some(latest) {
                continue;
            }
            if exclusive {
                pkg.installed.clear();
            }
            pkg.installed.insert(latest.clone());
            pkg.linked = Some(latest.clone());
            upgraded = true;
        }
        if upgraded {
            Ok(UpdateOutcome::Updated)
        } else {
            Ok(UpdateOutcome::AlreadyUpToDate)
        }
    }

    fn list_environments(&self) -> Result<Vec<String>> {
        if self.tool == Tool::Brew {
            return Err(self.unsupported("environments"));
        }
        Ok(self.state().environments.iter().cloned().collect())
    }

    fn environment_packages(&self, name: &str) -> Result<Vec<String>> {
        if self.tool == Tool::Brew {
            return Err(self.unsupported("environments"));
        }
        let state = self.state();
        if !state.environments.contains(name) {
            return Err(Error::NotFound {
                name: name.to_string(),
                stderr: format!("EnvironmentLocationNotFound: Not a conda environment: {name}"),
            });
        }
        Ok(state
            .packages
            .iter()
            .filter(|((env, _), pkg)| env.as_deref() == Some(name) && !pkg.installed.is_empty())
            .map(|((_, pkg_name), _)| pkg_name.clone())
            .collect())
    }

    fn create_environment(&self, name: &str) -> Result<()> {
        if self.tool == Tool::Brew {
            return Err(self.unsupported("environment creation"));
        }
        self.record("create_environment", name, None)?;
        self.state().environments.insert(name.to_string());
        Ok(())
    }

    fn remove_environment(&self, name: &str) -> Result<()> {
        if self.tool == Tool::Brew {
            return Err(self.unsupported("environment removal"));
        }
        self.record("remove_environment", name, None)?;
        let mut state = self.state();
        state.environments.remove(name);
        state
            .packages
            .retain(|(env, _), _| env.as_deref() != Some(name));
        Ok(())
    }
}
