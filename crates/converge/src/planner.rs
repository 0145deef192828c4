//! Reconciliation planner - desired state + observed state -> actions
//!
//! [`plan`] is a pure function: it performs no I/O and returns the same
//! plan for the same inputs. At most one version of a package is active;
//! the planner never guesses which one when the observation does not say.

use crate::error::PlanningError;
use crate::types::{Action, ActionPlan, DesiredStateSpec, LifecycleState, ObservedState};

/// Attached to every `head` plan.
pub const HEAD_WARNING: &str =
    "head builds track a moving source and are re-fetched on every run";

/// Compute the actions that move `observed` to the state `spec` describes.
pub fn plan(spec: &DesiredStateSpec, observed: &ObservedState) -> Result<ActionPlan, PlanningError> {
    let result = match spec.lifecycle() {
        LifecycleState::Present => match spec.version() {
            Some(version) => plan_present_version(spec, observed, version),
            None => plan_present_any(spec, observed),
        },
        LifecycleState::Absent => Ok(plan_absent(spec, observed)),
        LifecycleState::Linked => plan_linked(spec, observed),
        LifecycleState::Unlinked => plan_unlinked(spec, observed),
        LifecycleState::Head => {
            Ok(ActionPlan::for_package(spec, vec![Action::FetchHead]).with_warning(HEAD_WARNING))
        }
        LifecycleState::Latest => plan_latest(spec, observed),
    };

    match &result {
        Ok(plan) => log::debug!(
            "{} ({}): {}",
            plan.target(),
            spec.lifecycle(),
            plan.actions
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
        Err(e) => log::debug!("{}: planning failed: {e}", spec.identity()),
    }
    result
}

fn plan_present_version(
    spec: &DesiredStateSpec,
    observed: &ObservedState,
    version: &str,
) -> Result<ActionPlan, PlanningError> {
    if observed.is_active(version) {
        return Ok(ActionPlan::noop(spec));
    }

    if observed.has_version(version) {
        return Ok(ActionPlan::for_package(spec, switch_to(observed, version)));
    }

    // Without a recipe the registry must offer exactly this version
    let installable = spec.recipe().is_some()
        || observed.available_version.as_deref() == Some(version);
    if !installable {
        return Err(missing_recipe(spec));
    }

    Ok(ActionPlan::for_package(
        spec,
        vec![Action::Install {
            version: Some(version.to_string()),
            recipe: spec.recipe().map(str::to_string),
        }],
    ))
}

fn plan_present_any(
    spec: &DesiredStateSpec,
    observed: &ObservedState,
) -> Result<ActionPlan, PlanningError> {
    if observed.active_version.is_some() || observed.installed_versions.len() == 1 {
        return Ok(ActionPlan::noop(spec));
    }

    if !observed.installed_versions.is_empty() {
        return Err(indeterminate(spec, observed));
    }

    if observed.available_version.is_none() && spec.recipe().is_none() {
        return Err(missing_recipe(spec));
    }

    Ok(ActionPlan::for_package(
        spec,
        vec![Action::Install {
            version: observed.available_version.clone(),
            recipe: spec.recipe().map(str::to_string),
        }],
    ))
}

fn plan_absent(spec: &DesiredStateSpec, observed: &ObservedState) -> ActionPlan {
    let targets: Vec<&String> = match spec.version() {
        Some(version) => observed
            .installed_versions
            .iter()
            .filter(|v| v.as_str() == version)
            .collect(),
        None => observed.installed_versions.iter().collect(),
    };

    if targets.is_empty() {
        return ActionPlan::noop(spec);
    }

    let removes_active = targets.iter().any(|v| observed.is_active(v));
    let actions = targets
        .into_iter()
        .map(|v| Action::Remove { version: v.clone() })
        .collect();

    let plan = ActionPlan::for_package(spec, actions);
    if removes_active {
        // no implicit relink of a remaining version
        plan.with_warning(format!(
            "removes the active version of {}; no version is active afterwards",
            spec.identity()
        ))
    } else {
        plan
    }
}

fn plan_linked(
    spec: &DesiredStateSpec,
    observed: &ObservedState,
) -> Result<ActionPlan, PlanningError> {
    let version = require_installed_version(spec, observed)?;
    if observed.is_active(version) {
        return Ok(ActionPlan::noop(spec));
    }
    Ok(ActionPlan::for_package(
        spec,
        vec![Action::Link {
            version: version.to_string(),
        }],
    ))
}

fn plan_unlinked(
    spec: &DesiredStateSpec,
    observed: &ObservedState,
) -> Result<ActionPlan, PlanningError> {
    let version = require_installed_version(spec, observed)?;
    if !observed.is_active(version) {
        return Ok(ActionPlan::noop(spec));
    }
    Ok(ActionPlan::for_package(
        spec,
        vec![Action::Unlink {
            version: version.to_string(),
        }],
    ))
}

fn plan_latest(
    spec: &DesiredStateSpec,
    observed: &ObservedState,
) -> Result<ActionPlan, PlanningError> {
    let Some(latest) = observed.available_version.as_deref() else {
        // Only the recipe knows what the newest version is
        return match spec.recipe() {
            Some(recipe) => Ok(ActionPlan::for_package(
                spec,
                vec![Action::Install {
                    version: None,
                    recipe: Some(recipe.to_string()),
                }],
            )),
            None => Err(missing_recipe(spec)),
        };
    };

    if observed.is_active(latest) {
        return Ok(ActionPlan::noop(spec));
    }

    if observed.has_version(latest) {
        return Ok(ActionPlan::for_package(spec, switch_to(observed, latest)));
    }

    if !observed.installed_versions.is_empty() {
        return Ok(ActionPlan::for_package(spec, vec![Action::UpgradeLatest]));
    }

    Ok(ActionPlan::for_package(
        spec,
        vec![Action::Install {
            version: Some(latest.to_string()),
            recipe: spec.recipe().map(str::to_string),
        }],
    ))
}

/// Make an installed version the active one, unlinking the current one first.
fn switch_to(observed: &ObservedState, version: &str) -> Vec<Action> {
    observed
        .active_version
        .iter()
        .map(|v| Action::Unlink { version: v.clone() })
        .chain(std::iter::once(Action::Link {
            version: version.to_string(),
        }))
        .collect()
}

fn require_installed_version<'s>(
    spec: &'s DesiredStateSpec,
    observed: &ObservedState,
) -> Result<&'s str, PlanningError> {
    let version = spec.version().ok_or_else(|| PlanningError::AmbiguousVersion {
        name: spec.identity().name().to_string(),
        state: spec.lifecycle(),
    })?;
    if !observed.has_version(version) {
        return Err(PlanningError::NotInstalled {
            name: spec.identity().name().to_string(),
            version: version.to_string(),
        });
    }
    Ok(version)
}

fn missing_recipe(spec: &DesiredStateSpec) -> PlanningError {
    PlanningError::MissingRecipe {
        name: spec.identity().name().to_string(),
    }
}

fn indeterminate(spec: &DesiredStateSpec, observed: &ObservedState) -> PlanningError {
    PlanningError::IndeterminateActiveVersion {
        name: spec.identity().name().to_string(),
        installed: observed.installed_versions.iter().cloned().collect(),
    }
}

/// Observed state after a plan has been applied successfully.
///
/// Mirrors what the wrapped tool does for each action; used to check that
/// plans converge.
pub fn simulate(observed: &ObservedState, plan: &ActionPlan) -> ObservedState {
    let mut next = observed.clone();
    for action in &plan.actions {
        match action {
            Action::NoOp | Action::CreateEnv { .. } | Action::RemoveEnv { .. } => {}
            Action::Install { version, .. } => {
                let version = version
                    .clone()
                    .or_else(|| next.available_version.clone())
                    .unwrap_or_else(|| "recipe".to_string());
                if next.exclusive_versions {
                    next.installed_versions.clear();
                }
                next.installed_versions.insert(version.clone());
                next.active_version = Some(version);
                next.exists = true;
            }
            Action::Unlink { version } => {
                if next.is_active(version) {
                    next.active_version = None;
                }
            }
            Action::Link { version } => next.active_version = Some(version.clone()),
            Action::Remove { version } => {
                next.installed_versions.remove(version);
                if next.is_active(version) {
                    next.active_version = None;
                }
            }
            Action::FetchHead => {
                next.installed_versions.insert("HEAD".to_string());
                next.active_version = Some("HEAD".to_string());
                next.exists = true;
            }
            Action::UpgradeLatest => {
                if let Some(latest) = next.available_version.clone() {
                    next.installed_versions.insert(latest.clone());
                    next.active_version = Some(latest);
                }
            }
        }
    }
    next
}
