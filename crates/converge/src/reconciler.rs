//! Observe -> plan -> execute pipeline and batch driver

use crate::context::{ExecuteOptions, LogProgress, ProgressCallback};
use crate::environment::EnvironmentManager;
use crate::error::{Error, Result};
use crate::executor::execute;
use crate::inspector::Inspector;
use crate::planner::plan;
use crate::spec::{Declaration, DeclarationFile, validate};
use crate::types::{
    Action, ActionPlan, BatchOutcome, DesiredStateSpec, EnvironmentOutcome, EnvironmentSpec,
    LifecycleState, ObservedState, ReconcileOutcome,
};
use pkgkit::{Backend, UpdateOutcome};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;

/// Attached to every outcome that changed the host.
pub const DEPENDENCY_NOTE: &str =
    "dependency versions are chosen by the package manager and are not pinned";

/// Outcome of refreshing or upgrading the package manager itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub changed: bool,
    pub msg: String,
}

/// Outcome of applying a declaration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileOutcome {
    pub environments: Vec<EnvironmentOutcome>,
    pub packages: BatchOutcome,
    pub changed: bool,
    pub failed: bool,
}

/// Reconciles declarations against one package manager.
pub struct Reconciler<'a> {
    backend: &'a dyn Backend,
    options: ExecuteOptions,
}

impl<'a> Reconciler<'a> {
    pub fn new(backend: &'a dyn Backend, options: ExecuteOptions) -> Self {
        Self { backend, options }
    }

    /// Observe a package and compute its plan without applying it.
    pub fn plan(&self, spec: &DesiredStateSpec) -> Result<(ObservedState, ActionPlan)> {
        let observed = Inspector::new(self.backend).observe(spec.identity(), spec.environment())?;
        let plan = plan(spec, &observed)?;
        Ok((observed, plan))
    }

    /// Validate and reconcile one raw declaration.
    pub fn reconcile_declaration<P: ProgressCallback + ?Sized>(
        &self,
        declaration: &Declaration,
        progress: &mut P,
    ) -> ReconcileOutcome {
        match validate(declaration) {
            Ok(spec) => self.reconcile(&spec, progress),
            Err(e) => ReconcileOutcome {
                name: declaration.name.clone(),
                environment: declaration.environment.clone(),
                failed: true,
                msg: e.to_string(),
                ..Default::default()
            },
        }
    }

    /// Reconcile one validated spec.
    ///
    /// Every failure is reported in the outcome; nothing is returned as
    /// an error so batches can report each declaration.
    pub fn reconcile<P: ProgressCallback + ?Sized>(
        &self,
        spec: &DesiredStateSpec,
        progress: &mut P,
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome {
            name: spec.identity().name().to_string(),
            environment: spec.environment().map(str::to_string),
            ..Default::default()
        };

        let (observed, plan) = match self.plan(spec) {
            Ok(planned) => planned,
            Err(e) => {
                outcome.failed = true;
                outcome.category = e.category();
                outcome.msg = e.to_string();
                return outcome;
            }
        };

        outcome.plan = plan.actions.clone();
        outcome.warnings = plan.warnings.clone();

        let result = execute(self.backend, &plan, self.options.check_mode, progress);
        outcome.changed = result.changed;
        outcome.applied = result.applied;

        if let Some(failure) = result.error {
            outcome.failed = true;
            outcome.category = Some(failure.category);
            outcome.msg = failure.to_string();
            outcome.failed_action = Some((failure.index, failure.action));
            if outcome.changed {
                outcome.warnings.push(DEPENDENCY_NOTE.to_string());
            }
            return outcome;
        }

        if outcome.changed && !self.options.check_mode {
            outcome.warnings.push(DEPENDENCY_NOTE.to_string());
        }
        outcome.version_installed = version_installed(spec, &observed, &plan);
        outcome.msg = message(spec, &plan, result.changed, self.options.check_mode);
        outcome
    }

    /// Reconcile many specs.
    ///
    /// Declarations for different packages run in parallel; declarations
    /// for the same package in the same environment run in order. Results
    /// keep declaration order.
    pub fn reconcile_batch(&self, specs: &[DesiredStateSpec]) -> Result<BatchOutcome> {
        let groups = group_by_target(specs);
        log::debug!(
            "reconciling {} declaration(s) in {} group(s) with {} job(s)",
            specs.len(),
            groups.len(),
            self.options.jobs
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs.max(1))
            .build()
            .map_err(|e| Error::ThreadPool(e.to_string()))?;

        let mut indexed: Vec<(usize, ReconcileOutcome)> = pool.install(|| {
            groups
                .par_iter()
                .flat_map_iter(|group| {
                    let mut progress = LogProgress;
                    group
                        .iter()
                        .map(|&i| (i, self.reconcile(&specs[i], &mut progress)))
                        .collect::<Vec<_>>()
                })
                .collect()
        });
        indexed.sort_by_key(|(i, _)| *i);

        Ok(BatchOutcome::from_results(
            indexed.into_iter().map(|(_, outcome)| outcome).collect(),
        ))
    }

    /// Ensure one environment.
    pub fn ensure_environment<P: ProgressCallback + ?Sized>(
        &self,
        spec: &EnvironmentSpec,
        progress: &mut P,
    ) -> Result<EnvironmentOutcome> {
        EnvironmentManager::new(self.backend).ensure(spec, self.options.check_mode, progress)
    }

    /// Ensure an environment, then reconcile packages inside it.
    ///
    /// Declarations without an environment are bound to this one. Packages
    /// are skipped when the environment is being removed.
    pub fn reconcile_in_environment(
        &self,
        environment: &EnvironmentSpec,
        declarations: &[Declaration],
    ) -> Result<FileOutcome> {
        let env_outcome = self.ensure_environment(environment, &mut LogProgress)?;

        let packages = if environment.exists {
            let bound: Vec<Declaration> = declarations
                .iter()
                .map(|d| Declaration {
                    environment: d
                        .environment
                        .clone()
                        .or_else(|| Some(environment.name.clone())),
                    ..d.clone()
                })
                .collect();
            self.reconcile_declarations(&bound)?
        } else {
            BatchOutcome::from_results(Vec::new())
        };

        Ok(FileOutcome {
            changed: env_outcome.changed || packages.changed,
            failed: packages.failed,
            environments: vec![env_outcome],
            packages,
        })
    }

    /// Validate every declaration, then reconcile them as a batch.
    ///
    /// A single invalid declaration rejects the whole batch before anything
    /// is observed.
    pub fn reconcile_declarations(&self, declarations: &[Declaration]) -> Result<BatchOutcome> {
        let specs = declarations
            .iter()
            .map(validate)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        self.reconcile_batch(&specs)
    }

    /// Apply a declaration file: environments first, then packages.
    ///
    /// Packages scoped to an environment the file declares absent are
    /// skipped and reported as unchanged.
    pub fn apply_file(&self, file: &DeclarationFile) -> Result<FileOutcome> {
        // reject the whole file before touching anything
        let specs = file.validate()?;

        let mut environments = Vec::with_capacity(file.environments.len());
        for env in &file.environments {
            environments.push(self.ensure_environment(env, &mut LogProgress)?);
        }

        let removed: HashSet<&str> = file
            .environments
            .iter()
            .filter(|e| !e.exists)
            .map(|e| e.name.as_str())
            .collect();
        let (live, skipped): (Vec<_>, Vec<_>) = specs
            .into_iter()
            .enumerate()
            .partition(|(_, spec)| spec.environment().is_none_or(|e| !removed.contains(e)));
        let (indices, live): (Vec<usize>, Vec<DesiredStateSpec>) = live.into_iter().unzip();

        let batch = self.reconcile_batch(&live)?;
        let mut indexed: Vec<(usize, ReconcileOutcome)> = indices
            .into_iter()
            .zip(batch.results)
            .chain(skipped.iter().map(|(i, spec)| (*i, skipped_outcome(spec))))
            .collect();
        indexed.sort_by_key(|(i, _)| *i);
        let packages = BatchOutcome::from_results(
            indexed.into_iter().map(|(_, outcome)| outcome).collect(),
        );
        Ok(FileOutcome {
            changed: packages.changed || environments.iter().any(|e| e.changed),
            failed: packages.failed,
            environments,
            packages,
        })
    }

    /// Refresh the package manager itself.
    pub fn update_tool(&self) -> Result<ToolOutcome> {
        let tool = self.backend.tool();
        if self.options.check_mode {
            return Ok(ToolOutcome {
                changed: false,
                msg: format!("{tool} would be updated"),
            });
        }
        let outcome = match self.backend.update()? {
            UpdateOutcome::Updated => ToolOutcome {
                changed: true,
                msg: format!("{tool} updated successfully"),
            },
            UpdateOutcome::AlreadyUpToDate => ToolOutcome {
                changed: false,
                msg: format!("{tool} already up-to-date"),
            },
        };
        log::info!("{}", outcome.msg);
        Ok(outcome)
    }

    /// Upgrade every installed package.
    pub fn upgrade_all(&self) -> Result<ToolOutcome> {
        if self.options.check_mode {
            return Ok(ToolOutcome {
                changed: true,
                msg: "all packages would be upgraded".to_string(),
            });
        }
        let outcome = match self.backend.upgrade_all()? {
            UpdateOutcome::Updated => ToolOutcome {
                changed: true,
                msg: "all packages upgraded".to_string(),
            },
            UpdateOutcome::AlreadyUpToDate => ToolOutcome {
                changed: false,
                msg: "all packages already upgraded".to_string(),
            },
        };
        log::info!("{}", outcome.msg);
        Ok(outcome)
    }
}

/// Outcome for a package whose environment is being removed.
fn skipped_outcome(spec: &DesiredStateSpec) -> ReconcileOutcome {
    let environment = spec.environment().unwrap_or_default();
    log::info!(
        "skipping {}: environment {environment} is declared absent",
        spec.identity()
    );
    ReconcileOutcome {
        name: spec.identity().name().to_string(),
        environment: Some(environment.to_string()),
        msg: format!("Skipped: environment {environment} is declared absent"),
        ..Default::default()
    }
}

/// Indices of specs grouped by (environment, name), in first-seen order.
fn group_by_target(specs: &[DesiredStateSpec]) -> Vec<Vec<usize>> {
    let mut keys: Vec<(Option<String>, String)> = Vec::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, spec) in specs.iter().enumerate() {
        let key = spec.target_key();
        match keys.iter().position(|k| *k == key) {
            Some(g) => groups[g].push(i),
            None => {
                keys.push(key);
                groups.push(vec![i]);
            }
        }
    }
    groups
}

/// Version active once the plan has been applied, when known.
fn version_installed(
    spec: &DesiredStateSpec,
    observed: &ObservedState,
    plan: &ActionPlan,
) -> Option<String> {
    match spec.lifecycle() {
        LifecycleState::Absent | LifecycleState::Unlinked => return None,
        _ => {}
    }

    plan.actions
        .iter()
        .rev()
        .find_map(|action| match action {
            Action::UpgradeLatest => observed.available_version.clone(),
            other => other.resulting_version().map(str::to_string),
        })
        .or_else(|| {
            if plan.is_noop() {
                spec.version()
                    .map(str::to_string)
                    .or_else(|| observed.active_version.clone())
                    .or_else(|| observed.installed_versions.iter().next().cloned())
            } else {
                None
            }
        })
}

fn message(spec: &DesiredStateSpec, plan: &ActionPlan, changed: bool, check_mode: bool) -> String {
    let subject = match spec.version() {
        Some(v) => format!("{} {}", plan.target(), v),
        None => plan.target(),
    };

    let (done, already) = match spec.lifecycle() {
        LifecycleState::Present => ("installed", "already installed"),
        LifecycleState::Absent => ("uninstalled", "already uninstalled"),
        LifecycleState::Linked => ("linked", "already linked"),
        LifecycleState::Unlinked => ("unlinked", "already unlinked"),
        LifecycleState::Head => ("built from head", "already built from head"),
        LifecycleState::Latest => ("upgraded", "already upgraded"),
    };

    match (changed, check_mode) {
        (false, _) => format!("Package {already}: {subject}"),
        (true, true) => format!("Package would be {done}: {subject}"),
        (true, false) => format!("Package {done}: {subject}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NoProgress;
    use pkgkit::{ErrorCategory, MockBackend, PackageRef, Tool};

    fn reconciler(mock: &MockBackend) -> Reconciler<'_> {
        Reconciler::new(mock, ExecuteOptions::default())
    }

    fn spec(decl: Declaration) -> DesiredStateSpec {
        validate(&decl).unwrap()
    }

    #[test]
    fn test_reconcile_fresh_install() {
        let mock = MockBackend::new(Tool::Brew);
        let outcome = reconciler(&mock).reconcile(
            &spec(Declaration::new("samtools").version("1.17").recipe("samtools.rb")),
            &mut NoProgress,
        );

        assert!(outcome.changed);
        assert!(!outcome.failed);
        assert_eq!(outcome.version_installed.as_deref(), Some("1.17"));
        assert_eq!(outcome.msg, "Package installed: samtools 1.17");
        assert!(outcome.warnings.contains(&DEPENDENCY_NOTE.to_string()));
        assert_eq!(
            mock.linked(&PackageRef::new("samtools")).as_deref(),
            Some("1.17")
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mock = MockBackend::new(Tool::Brew)
            .with_installed("samtools", &["1.17", "1.18"])
            .with_linked("samtools", "1.17");
        let r = reconciler(&mock);
        let s = spec(Declaration::new("samtools").version("1.18"));

        let first = r.reconcile(&s, &mut NoProgress);
        assert!(first.changed);
        assert_eq!(first.msg, "Package installed: samtools 1.18");

        let second = r.reconcile(&s, &mut NoProgress);
        assert!(!second.changed);
        assert_eq!(second.plan, vec![Action::NoOp]);
        assert_eq!(second.msg, "Package already installed: samtools 1.18");
        assert_eq!(second.version_installed.as_deref(), Some("1.18"));
        assert!(second.warnings.is_empty());
    }

    #[test]
    fn test_reconcile_latest_upgrade_reports_version() {
        let mock = MockBackend::new(Tool::Brew)
            .with_available("jq", "1.7")
            .with_installed("jq", &["1.6"])
            .with_linked("jq", "1.6");
        let outcome = reconciler(&mock).reconcile(
            &spec(Declaration::new("jq").state("latest")),
            &mut NoProgress,
        );

        assert_eq!(outcome.applied, vec![Action::UpgradeLatest]);
        assert_eq!(outcome.version_installed.as_deref(), Some("1.7"));
        assert_eq!(outcome.msg, "Package upgraded: jq");
    }

    #[test]
    fn test_reconcile_planning_error_has_no_side_effects() {
        let mock = MockBackend::new(Tool::Brew).with_installed("jq", &["1.6", "1.7"]);
        let outcome = reconciler(&mock).reconcile(&spec(Declaration::new("jq")), &mut NoProgress);

        assert!(outcome.failed);
        assert!(!outcome.changed);
        assert!(outcome.msg.contains("none is active"));
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_reconcile_execution_failure() {
        let mock = MockBackend::new(Tool::Brew)
            .with_installed("jq", &["1.6"])
            .with_linked("jq", "1.6");
        mock.fail_on("install", "Error: Permission denied @ apply2files");

        let outcome = reconciler(&mock).reconcile(
            &spec(Declaration::new("jq").version("1.7").recipe("jq.rb")),
            &mut NoProgress,
        );

        assert!(outcome.failed);
        assert!(!outcome.changed);
        assert!(outcome.applied.is_empty());
        assert_eq!(outcome.category, Some(ErrorCategory::Permission));
        assert_eq!(outcome.failed_action.as_ref().map(|(i, _)| *i), Some(0));
        assert!(outcome.msg.starts_with("action 1 (install 1.7 from jq.rb) failed"));
        // the active version stays linked
        assert_eq!(mock.calls(), vec!["install jq"]);
        assert_eq!(mock.linked(&PackageRef::new("jq")).as_deref(), Some("1.6"));
    }

    #[test]
    fn test_reconcile_switch_failure_keeps_applied_prefix() {
        let mock = MockBackend::new(Tool::Brew)
            .with_installed("jq", &["1.6", "1.7"])
            .with_linked("jq", "1.6");
        mock.fail_on("link", "Error: Permission denied @ dir_s_mkdir");

        let outcome = reconciler(&mock).reconcile(
            &spec(Declaration::new("jq").version("1.7")),
            &mut NoProgress,
        );

        assert!(outcome.failed);
        assert!(outcome.changed);
        assert_eq!(
            outcome.applied,
            vec![Action::Unlink {
                version: "1.6".into()
            }]
        );
        assert_eq!(outcome.failed_action.as_ref().map(|(i, _)| *i), Some(1));
        assert!(outcome.msg.starts_with("action 2 (link 1.7) failed"));
    }

    #[test]
    fn test_reconcile_declaration_validation_failure() {
        let mock = MockBackend::new(Tool::Brew);
        let outcome = reconciler(&mock).reconcile_declaration(
            &Declaration::new("jq").state("head").version("1.2.3"),
            &mut NoProgress,
        );

        assert!(outcome.failed);
        assert!(outcome.msg.contains("does not take a version"));
        assert!(outcome.plan.is_empty());
    }

    #[test]
    fn test_check_mode() {
        let mock = MockBackend::new(Tool::Brew).with_available("jq", "1.7");
        let r = Reconciler::new(
            &mock,
            ExecuteOptions {
                check_mode: true,
                ..Default::default()
            },
        );

        let outcome = r.reconcile(&spec(Declaration::new("jq")), &mut NoProgress);

        assert!(outcome.changed);
        assert_eq!(outcome.msg, "Package would be installed: jq");
        assert!(outcome.applied.is_empty());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_batch_summary_and_order() {
        let mock = MockBackend::new(Tool::Brew)
            .with_available("jq", "1.7")
            .with_available("ripgrep", "14.1.0")
            .with_installed("ripgrep", &["14.1.0"])
            .with_linked("ripgrep", "14.1.0");
        let specs = vec![
            spec(Declaration::new("jq")),
            spec(Declaration::new("ripgrep")),
            spec(Declaration::new("jq").state("absent")),
        ];

        let batch = reconciler(&mock).reconcile_batch(&specs).unwrap();

        let names: Vec<_> = batch.results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["jq", "ripgrep", "jq"]);
        // same package runs in declaration order: install, then remove
        assert!(batch.results[0].changed);
        assert_eq!(
            batch.results[2].applied,
            vec![Action::Remove {
                version: "1.7".into()
            }]
        );
        assert_eq!(batch.msg, "Changed: 2, Unchanged: 1");
        assert!(!batch.failed);
    }

    #[test]
    fn test_reconcile_declarations_rejects_invalid_batch() {
        let mock = MockBackend::new(Tool::Brew).with_available("jq", "1.7");
        let err = reconciler(&mock)
            .reconcile_declarations(&[Declaration::new("jq"), Declaration::new("")])
            .unwrap_err();

        assert_eq!(err.kind(), "validation");
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_group_by_target() {
        let specs = vec![
            spec(Declaration::new("a")),
            spec(Declaration::new("b")),
            spec(Declaration::new("a").environment("bio")),
            spec(Declaration::new("a").state("absent")),
        ];
        assert_eq!(group_by_target(&specs), vec![vec![0, 3], vec![1], vec![2]]);
    }

    #[test]
    fn test_reconcile_in_environment() {
        let mock = MockBackend::new(Tool::Conda).with_available("samtools", "1.19");
        let env = EnvironmentSpec {
            name: "bio".into(),
            exists: true,
            force: false,
        };

        let outcome = reconciler(&mock)
            .reconcile_in_environment(&env, &[Declaration::new("samtools")])
            .unwrap();

        assert!(outcome.changed);
        assert_eq!(outcome.packages.results[0].environment.as_deref(), Some("bio"));
        let scoped = PackageRef::new("samtools").in_environment(Some("bio"));
        assert_eq!(mock.linked(&scoped).as_deref(), Some("1.19"));
        assert!(mock.installed(&PackageRef::new("samtools")).is_empty());
    }

    #[test]
    fn test_apply_file() {
        let mock = MockBackend::new(Tool::Conda).with_available("samtools", "1.19");
        let file: DeclarationFile = serde_json::from_str(
            r#"{
                "environment": [{"name": "bio"}],
                "package": [{"name": "samtools", "environment": "bio", "state": "latest"}]
            }"#,
        )
        .unwrap();

        let outcome = reconciler(&mock).apply_file(&file).unwrap();

        assert!(outcome.changed);
        assert!(!outcome.failed);
        assert_eq!(
            mock.calls(),
            vec!["create_environment bio", "install bio:samtools"]
        );
    }

    #[test]
    fn test_apply_file_skips_packages_in_removed_environment() {
        let mock = MockBackend::new(Tool::Conda)
            .with_available("jq", "1.7")
            .with_installed_in(Some("old"), "samtools", &["1.17"]);
        let file: DeclarationFile = serde_json::from_str(
            r#"{
                "environment": [{"name": "old", "exists": false, "force": true}],
                "package": [
                    {"name": "samtools", "environment": "old", "version": "1.19", "recipe": "bioconda"},
                    {"name": "jq"}
                ]
            }"#,
        )
        .unwrap();

        let outcome = reconciler(&mock).apply_file(&file).unwrap();

        assert!(outcome.changed);
        assert!(!outcome.failed);
        assert_eq!(mock.calls(), vec!["remove_environment old", "install jq"]);

        let skipped = &outcome.packages.results[0];
        assert_eq!(skipped.name, "samtools");
        assert_eq!(skipped.environment.as_deref(), Some("old"));
        assert!(!skipped.changed);
        assert!(!skipped.failed);
        assert!(skipped.plan.is_empty());
        assert_eq!(skipped.msg, "Skipped: environment old is declared absent");
        assert_eq!(outcome.packages.results[1].name, "jq");
        assert!(outcome.packages.results[1].changed);
    }

    #[test]
    fn test_update_tool() {
        let mock = MockBackend::new(Tool::Brew).up_to_date();
        let outcome = reconciler(&mock).update_tool().unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.msg, "brew already up-to-date");

        let mock = MockBackend::new(Tool::Conda);
        let outcome = reconciler(&mock).update_tool().unwrap();
        assert!(outcome.changed);
    }

    #[test]
    fn test_upgrade_all() {
        let mock = MockBackend::new(Tool::Brew)
            .with_available("jq", "1.7")
            .with_installed("jq", &["1.6"])
            .with_linked("jq", "1.6");
        let r = reconciler(&mock);

        let outcome = r.upgrade_all().unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.msg, "all packages upgraded");
        assert_eq!(mock.linked(&PackageRef::new("jq")).as_deref(), Some("1.7"));

        let again = r.upgrade_all().unwrap();
        assert!(!again.changed);
        assert_eq!(again.msg, "all packages already upgraded");
    }
}
