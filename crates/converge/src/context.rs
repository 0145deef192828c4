//! Execution options and progress callbacks
//!
//! These traits let the reconciler report progress without depending on a
//! particular terminal UI.

use crate::types::{Action, ActionPlan};
use pkgkit::Error as ToolError;

/// Progress callback for plan execution
///
/// Implement this trait to receive progress updates while actions run.
pub trait ProgressCallback: Send {
    /// Called before the first action of a plan
    fn on_plan_start(&mut self, plan: &ActionPlan);

    /// Called before an action is handed to the wrapped tool
    fn on_action_start(&mut self, target: &str, action: &Action);

    /// Called after an action completes, successfully or not
    fn on_action_complete(&mut self, target: &str, action: &Action, error: Option<&ToolError>);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_plan_start(&mut self, _plan: &ActionPlan) {}
    fn on_action_start(&mut self, _target: &str, _action: &Action) {}
    fn on_action_complete(&mut self, _target: &str, _action: &Action, _error: Option<&ToolError>) {}
}

/// Progress callback that reports through the `log` facade
pub struct LogProgress;

impl ProgressCallback for LogProgress {
    fn on_plan_start(&mut self, plan: &ActionPlan) {
        if !plan.is_noop() {
            log::debug!("{}: {} action(s) planned", plan.target(), plan.actions.len());
        }
    }

    fn on_action_start(&mut self, target: &str, action: &Action) {
        log::debug!("{target}: {action}");
    }

    fn on_action_complete(&mut self, target: &str, action: &Action, error: Option<&ToolError>) {
        match error {
            None => log::info!("{target}: {action}"),
            Some(e) => log::warn!("{target}: {action} failed: {e}"),
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Plan and report without invoking the wrapped tool
    pub check_mode: bool,
    /// Number of packages reconciled in parallel within a batch
    pub jobs: usize,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            check_mode: false,
            jobs: 4,
        }
    }
}
