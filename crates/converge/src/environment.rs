//! Named environment lifecycle

use crate::context::ProgressCallback;
use crate::error::{Error, Result};
use crate::executor::execute;
use crate::inspector::Inspector;
use crate::types::{Action, ActionPlan, EnvironmentOutcome, EnvironmentSpec, EnvironmentState};
use pkgkit::Backend;

/// Ensures environments exist or not, then scopes packages into them.
pub struct EnvironmentManager<'a> {
    backend: &'a dyn Backend,
}

impl<'a> EnvironmentManager<'a> {
    pub fn new(backend: &'a dyn Backend) -> Self {
        Self { backend }
    }

    /// Plan for one environment. Refuses to drop an environment that still
    /// holds packages unless `force` is set.
    pub fn plan(&self, spec: &EnvironmentSpec, state: &EnvironmentState) -> Result<ActionPlan> {
        let actions = match (spec.exists, state.exists) {
            (true, false) => vec![Action::CreateEnv {
                name: spec.name.clone(),
            }],
            (false, true) => {
                if !state.packages.is_empty() && !spec.force {
                    return Err(Error::EnvironmentInUse {
                        name: spec.name.clone(),
                        packages: state.packages.clone(),
                    });
                }
                vec![Action::RemoveEnv {
                    name: spec.name.clone(),
                }]
            }
            _ => vec![Action::NoOp],
        };
        Ok(ActionPlan::for_environment(&spec.name, actions))
    }

    /// Observe, plan and apply one environment spec.
    pub fn ensure<P: ProgressCallback + ?Sized>(
        &self,
        spec: &EnvironmentSpec,
        check_mode: bool,
        progress: &mut P,
    ) -> Result<EnvironmentOutcome> {
        let state = Inspector::new(self.backend).observe_environment(&spec.name)?;
        let plan = self.plan(spec, &state)?;
        let result = execute(self.backend, &plan, check_mode, progress);

        if let Some(failure) = result.error {
            return Err(failure.into());
        }

        let msg = match (result.changed, spec.exists, check_mode) {
            (false, true, _) => format!("environment {} already exists", spec.name),
            (false, false, _) => format!("environment {} does not exist", spec.name),
            (true, true, false) => format!("created environment {}", spec.name),
            (true, false, false) => format!("removed environment {}", spec.name),
            (true, true, true) => format!("environment {} would be created", spec.name),
            (true, false, true) => format!("environment {} would be removed", spec.name),
        };

        Ok(EnvironmentOutcome {
            name: spec.name.clone(),
            changed: result.changed,
            failed: false,
            msg,
            plan: plan.actions,
            applied: result.applied,
        })
    }
}
