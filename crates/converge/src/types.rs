//! Core types for package-state reconciliation

use crate::error::ExecutionFailure;
use pkgkit::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Name of a package, unique within one environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageIdentity(String);

impl PackageIdentity {
    /// Callers go through validation; the name is known to be well-formed here.
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The package name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Desired relationship between a package and the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Installed (at a version, when one is given) and active
    Present,
    /// Not installed
    Absent,
    /// Installed version is the active one
    Linked,
    /// Installed version is not the active one
    Unlinked,
    /// Built from the moving head of its source
    Head,
    /// Newest version the registry declares, active
    Latest,
}

impl LifecycleState {
    /// States that resolve their own version and reject an explicit one.
    pub fn forbids_version(&self) -> bool {
        matches!(self, Self::Head | Self::Latest)
    }

    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Linked => "linked",
            Self::Unlinked => "unlinked",
            Self::Head => "head",
            Self::Latest => "latest",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "present" | "installed" => Ok(Self::Present),
            "absent" | "removed" | "uninstalled" => Ok(Self::Absent),
            "linked" => Ok(Self::Linked),
            "unlinked" => Ok(Self::Unlinked),
            "head" => Ok(Self::Head),
            "latest" | "upgraded" => Ok(Self::Latest),
            other => Err(other.to_string()),
        }
    }
}

/// A validated reconciliation request.
///
/// Only [`crate::spec::validate`] builds one, and it is never mutated
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredStateSpec {
    pub(crate) identity: PackageIdentity,
    pub(crate) lifecycle: LifecycleState,
    pub(crate) version: Option<String>,
    pub(crate) recipe: Option<String>,
    pub(crate) environment: Option<String>,
}

impl DesiredStateSpec {
    /// Package being reconciled.
    pub fn identity(&self) -> &PackageIdentity {
        &self.identity
    }

    /// Requested lifecycle state.
    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle
    }

    /// Requested version, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Recipe file, URL or channel, if any.
    pub fn recipe(&self) -> Option<&str> {
        self.recipe.as_deref()
    }

    /// Environment the package is scoped to, if any.
    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }

    /// Key used to serialize declarations that target the same package.
    pub fn target_key(&self) -> (Option<String>, String) {
        (self.environment.clone(), self.identity.name().to_string())
    }
}

/// Installed state of one package, as reported by the wrapped tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    /// Every installed version
    pub installed_versions: BTreeSet<String>,
    /// The version currently on the search path
    pub active_version: Option<String>,
    /// Whether the tool knows the package at all
    pub exists: bool,
    /// Newest version the registry or recipe declares
    pub available_version: Option<String>,
    /// Installing a version replaces the active one (one version per namespace)
    pub exclusive_versions: bool,
}

impl ObservedState {
    /// Observation of a package the tool knows nothing about.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Whether a version is installed.
    pub fn has_version(&self, version: &str) -> bool {
        self.installed_versions.contains(version)
    }

    /// Whether a version is the active one.
    pub fn is_active(&self, version: &str) -> bool {
        self.active_version.as_deref() == Some(version)
    }
}

/// Observed state of a named environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub name: String,
    pub exists: bool,
    /// Packages installed in the environment
    pub packages: Vec<String>,
}

/// Desired state of a named environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentSpec {
    pub name: String,
    #[serde(default = "default_true")]
    pub exists: bool,
    /// Remove the environment even when packages are still installed in it
    #[serde(default)]
    pub force: bool,
}

fn default_true() -> bool {
    true
}

/// One step of a reconciliation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    NoOp,
    Install {
        version: Option<String>,
        recipe: Option<String>,
    },
    Unlink {
        version: String,
    },
    Link {
        version: String,
    },
    Remove {
        version: String,
    },
    FetchHead,
    UpgradeLatest,
    CreateEnv {
        name: String,
    },
    RemoveEnv {
        name: String,
    },
}

impl Action {
    /// Whether the action leaves the host untouched.
    pub fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp)
    }

    /// Version that is active after the action succeeds, when it determines one.
    pub fn resulting_version(&self) -> Option<&str> {
        match self {
            Self::Install { version, .. } => version.as_deref(),
            Self::Link { version } => Some(version),
            _ => None,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoOp => write!(f, "no-op"),
            Self::Install { version, recipe } => {
                write!(f, "install {}", version.as_deref().unwrap_or("newest"))?;
                if let Some(recipe) = recipe {
                    write!(f, " from {recipe}")?;
                }
                Ok(())
            }
            Self::Unlink { version } => write!(f, "unlink {version}"),
            Self::Link { version } => write!(f, "link {version}"),
            Self::Remove { version } => write!(f, "remove {version}"),
            Self::FetchHead => write!(f, "fetch head"),
            Self::UpgradeLatest => write!(f, "upgrade to latest"),
            Self::CreateEnv { name } => write!(f, "create environment {name}"),
            Self::RemoveEnv { name } => write!(f, "remove environment {name}"),
        }
    }
}

/// Ordered actions for one package or environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionPlan {
    /// Package the actions apply to; `None` for environment plans
    pub package: Option<PackageIdentity>,
    pub environment: Option<String>,
    pub actions: Vec<Action>,
    /// Caveats the caller must see, such as leaving no version active
    pub warnings: Vec<String>,
}

impl ActionPlan {
    /// Plan for a package.
    pub fn for_package(spec: &DesiredStateSpec, actions: Vec<Action>) -> Self {
        Self {
            package: Some(spec.identity.clone()),
            environment: spec.environment.clone(),
            actions,
            warnings: Vec::new(),
        }
    }

    /// Plan for an environment.
    pub fn for_environment(name: &str, actions: Vec<Action>) -> Self {
        Self {
            package: None,
            environment: Some(name.to_string()),
            actions,
            warnings: Vec::new(),
        }
    }

    /// Plan that changes nothing.
    pub fn noop(spec: &DesiredStateSpec) -> Self {
        Self::for_package(spec, vec![Action::NoOp])
    }

    /// Attach a warning.
    #[must_use]
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Whether applying the plan changes nothing.
    pub fn is_noop(&self) -> bool {
        self.actions.iter().all(Action::is_noop)
    }

    /// Human-readable target, e.g. `bio:samtools`.
    pub fn target(&self) -> String {
        match (&self.environment, &self.package) {
            (Some(env), Some(pkg)) => format!("{env}:{pkg}"),
            (None, Some(pkg)) => pkg.to_string(),
            (Some(env), None) => env.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Result of executing a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionResult {
    /// Whether anything was (or, in check mode, would be) changed
    pub changed: bool,
    /// Actions that succeeded, in plan order
    pub applied: Vec<Action>,
    pub error: Option<ExecutionFailure>,
}

impl ExecutionResult {
    /// Whether every action succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Caller-facing result of reconciling one declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileOutcome {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    pub changed: bool,
    pub failed: bool,
    pub version_installed: Option<String>,
    pub msg: String,
    pub warnings: Vec<String>,
    /// Planned actions (empty when validation or planning failed)
    pub plan: Vec<Action>,
    /// Actions that were applied
    pub applied: Vec<Action>,
    /// Index and action of the step that failed, if execution failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_action: Option<(usize, Action)>,
    /// Tool error category, for advice
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
}

/// Result of reconciling a batch of declarations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub results: Vec<ReconcileOutcome>,
    pub changed: bool,
    pub failed: bool,
    pub msg: String,
}

impl BatchOutcome {
    /// Aggregate per-declaration outcomes, kept in declaration order.
    pub fn from_results(results: Vec<ReconcileOutcome>) -> Self {
        let changed_count = results.iter().filter(|r| r.changed).count();
        let failed: Vec<&ReconcileOutcome> = results.iter().filter(|r| r.failed).collect();

        let msg = if let Some(first) = failed.first() {
            first.msg.clone()
        } else if results.len() > 1 {
            format!(
                "Changed: {}, Unchanged: {}",
                changed_count,
                results.len() - changed_count
            )
        } else {
            results.first().map(|r| r.msg.clone()).unwrap_or_default()
        };

        Self {
            changed: changed_count > 0,
            failed: !failed.is_empty(),
            msg,
            results,
        }
    }

    /// Number of declarations that changed the host.
    pub fn changed_count(&self) -> usize {
        self.results.iter().filter(|r| r.changed).count()
    }
}

/// Result of ensuring an environment's existence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentOutcome {
    pub name: String,
    pub changed: bool,
    pub failed: bool,
    pub msg: String,
    pub plan: Vec<Action>,
    pub applied: Vec<Action>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_aliases() {
        assert_eq!("installed".parse(), Ok(LifecycleState::Present));
        assert_eq!("Upgraded".parse(), Ok(LifecycleState::Latest));
        assert_eq!("removed".parse(), Ok(LifecycleState::Absent));
        assert_eq!("UNINSTALLED".parse(), Ok(LifecycleState::Absent));
        assert_eq!(
            "purged".parse::<LifecycleState>(),
            Err("purged".to_string())
        );
    }

    #[test]
    fn test_forbids_version() {
        assert!(LifecycleState::Head.forbids_version());
        assert!(LifecycleState::Latest.forbids_version());
        assert!(!LifecycleState::Present.forbids_version());
    }

    #[test]
    fn test_action_display() {
        let install = Action::Install {
            version: Some("1.17".into()),
            recipe: Some("samtools.rb".into()),
        };
        assert_eq!(install.to_string(), "install 1.17 from samtools.rb");
        assert_eq!(
            Action::Install {
                version: None,
                recipe: None
            }
            .to_string(),
            "install newest"
        );
        assert_eq!(Action::Unlink { version: "1.0".into() }.to_string(), "unlink 1.0");
    }

    #[test]
    fn test_action_serialization_is_tagged() {
        let json = serde_json::to_string(&Action::Link { version: "2.0".into() }).unwrap();
        assert_eq!(json, r#"{"action":"link","version":"2.0"}"#);
        let json = serde_json::to_string(&Action::NoOp).unwrap();
        assert_eq!(json, r#"{"action":"no_op"}"#);
    }

    #[test]
    fn test_batch_summary_message() {
        let changed = ReconcileOutcome {
            name: "a".into(),
            changed: true,
            msg: "installed".into(),
            ..Default::default()
        };
        let unchanged = ReconcileOutcome {
            name: "b".into(),
            msg: "already present".into(),
            ..Default::default()
        };

        let batch = BatchOutcome::from_results(vec![changed.clone(), unchanged.clone(), unchanged]);
        assert_eq!(batch.msg, "Changed: 1, Unchanged: 2");
        assert!(batch.changed);
        assert!(!batch.failed);

        let single = BatchOutcome::from_results(vec![changed]);
        assert_eq!(single.msg, "installed");
    }

    #[test]
    fn test_batch_failure_message_wins() {
        let failed = ReconcileOutcome {
            name: "a".into(),
            failed: true,
            msg: "boom".into(),
            ..Default::default()
        };
        let ok = ReconcileOutcome {
            name: "b".into(),
            ..Default::default()
        };

        let batch = BatchOutcome::from_results(vec![ok, failed]);
        assert!(batch.failed);
        assert_eq!(batch.msg, "boom");
    }
}
