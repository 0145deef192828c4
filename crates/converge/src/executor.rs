//! Execution engine - applies a plan's actions through a backend

use crate::context::ProgressCallback;
use crate::error::ExecutionFailure;
use crate::types::{Action, ActionPlan, ExecutionResult};
use pkgkit::{Backend, PackageRef};

/// Apply a plan's actions in order, halting at the first failure.
///
/// `applied` is the prefix of actions that succeeded. Nothing is rolled
/// back or retried. A no-op plan never reaches the wrapped tool. In check
/// mode nothing is invoked and `changed` reports whether the plan would
/// change anything.
pub fn execute<P: ProgressCallback + ?Sized>(
    backend: &dyn Backend,
    plan: &ActionPlan,
    check_mode: bool,
    progress: &mut P,
) -> ExecutionResult {
    if plan.is_noop() {
        return ExecutionResult::default();
    }

    if check_mode {
        return ExecutionResult {
            changed: true,
            applied: Vec::new(),
            error: None,
        };
    }

    progress.on_plan_start(plan);
    let target = plan.target();
    let package = plan
        .package
        .as_ref()
        .map(|p| PackageRef::new(p.name()).in_environment(plan.environment.as_deref()));

    let mut applied = Vec::with_capacity(plan.actions.len());
    for (index, action) in plan.actions.iter().enumerate() {
        if action.is_noop() {
            continue;
        }

        progress.on_action_start(&target, action);
        let outcome = apply_action(backend, package.as_ref(), action);
        progress.on_action_complete(&target, action, outcome.as_ref().err());

        if let Err(e) = outcome {
            return ExecutionResult {
                changed: !applied.is_empty(),
                error: Some(ExecutionFailure {
                    index,
                    action: action.clone(),
                    diagnostic: e.diagnostic(),
                    category: e.category(),
                    applied: applied.clone(),
                }),
                applied,
            };
        }
        applied.push(action.clone());
    }

    ExecutionResult {
        changed: !applied.is_empty(),
        applied,
        error: None,
    }
}

/// Apply one action.
fn apply_action(
    backend: &dyn Backend,
    package: Option<&PackageRef>,
    action: &Action,
) -> pkgkit::Result<()> {
    let require_package = || {
        package.ok_or_else(|| {
            pkgkit::Error::Other(format!("action '{action}' needs a package"))
        })
    };

    match action {
        Action::NoOp => Ok(()),
        Action::Install { version, recipe } => {
            backend.install(require_package()?, version.as_deref(), recipe.as_deref())
        }
        Action::Unlink { version } => backend.unlink(require_package()?, version),
        Action::Link { version } => backend.link(require_package()?, version),
        Action::Remove { version } => backend.uninstall(require_package()?, version),
        Action::FetchHead => backend.fetch_head(require_package()?),
        Action::UpgradeLatest => backend.upgrade(require_package()?),
        Action::CreateEnv { name } => backend.create_environment(name),
        Action::RemoveEnv { name } => backend.remove_environment(name),
    }
}
