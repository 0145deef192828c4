//! Result rendering: one JSON document for automation, coloured text for people

use anyhow::Result;
use colored::Colorize;
use converge::{
    Action, BatchOutcome, DEPENDENCY_NOTE, EnvironmentOutcome, FileOutcome, ObservedState,
    ReconcileOutcome, ToolOutcome,
};
use pkgkit::ErrorCategory;
use serde::Serialize;

use crate::Context;
use crate::cli::OutputFormat;
use crate::ui;

/// Print `value` as JSON, or hand it to `text` for human output.
pub fn emit<T: Serialize>(ctx: &Context, value: &T, text: impl FnOnce(&T)) -> Result<()> {
    match ctx.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

/// Structured form of an error that stopped a command.
#[derive(Debug, Serialize)]
struct FailureReport {
    changed: bool,
    failed: bool,
    msg: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<ErrorCategory>,
}

fn failure_report(err: &anyhow::Error) -> FailureReport {
    let (kind, category, changed) = match err.downcast_ref::<converge::Error>() {
        Some(e) => (e.kind(), e.category(), !e.is_side_effect_free()),
        None => match err.downcast_ref::<pkgkit::Error>() {
            Some(e) => ("tool", Some(e.category()), false),
            None => ("internal", None, false),
        },
    };
    FailureReport {
        changed,
        failed: true,
        msg: format!("{err:#}"),
        kind,
        category,
    }
}

/// Report an error that stopped a command.
pub fn failure(format: OutputFormat, err: &anyhow::Error) {
    let report = failure_report(err);
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(_) => ui::error(&report.msg),
        },
        OutputFormat::Text => {
            ui::error(&report.msg);
            if let Some(category) = report.category {
                eprintln!("  {} {}", "→".dimmed(), category.advice().dimmed());
            }
        }
    }
}

// ============================================================================
// Packages
// ============================================================================

fn subject(outcome: &ReconcileOutcome) -> String {
    match &outcome.environment {
        Some(env) => format!("{env}:{}", outcome.name),
        None => outcome.name.clone(),
    }
}

fn actions(actions: &[Action]) -> String {
    actions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_plan(plan: &[Action]) {
    let steps: Vec<&Action> = plan.iter().filter(|a| !a.is_noop()).collect();
    for (i, action) in steps.iter().enumerate() {
        ui::step(i + 1, steps.len(), &action.to_string());
    }
}

/// One declaration's outcome.
pub fn result(ctx: &Context, outcome: &ReconcileOutcome, show_plan: bool) {
    if outcome.failed {
        ui::error(&format!("{}: {}", subject(outcome), outcome.msg));
        if let Some(category) = outcome.category {
            eprintln!("  {} {}", "→".dimmed(), category.advice().dimmed());
        }
        if !outcome.applied.is_empty() {
            ui::dim(&format!("applied before failure: {}", actions(&outcome.applied)));
        }
    } else if outcome.changed {
        ui::success(&outcome.msg);
    } else if !ctx.quiet {
        ui::info(&outcome.msg);
    }

    if show_plan {
        print_plan(&outcome.plan);
    }

    for warning in outcome.warnings.iter().filter(|w| *w != DEPENDENCY_NOTE) {
        ui::warn(warning);
    }
}

/// A batch of outcomes followed by its summary.
pub fn batch(ctx: &Context, outcome: &BatchOutcome, show_plan: bool) {
    for r in &outcome.results {
        result(ctx, r, show_plan);
    }

    if outcome.results.len() > 1 {
        let failed = outcome.results.iter().filter(|r| r.failed).count();
        if failed > 0 {
            ui::error(&format!(
                "{failed} of {} declarations failed",
                outcome.results.len()
            ));
        } else if !ctx.quiet {
            ui::header(&outcome.msg);
        }
    }

    let noted = outcome
        .results
        .iter()
        .any(|r| r.warnings.iter().any(|w| w == DEPENDENCY_NOTE));
    if noted && !ctx.quiet {
        ui::dim(&format!("note: {DEPENDENCY_NOTE}"));
    }
}

/// Outcome of applying a declaration file.
pub fn file(ctx: &Context, outcome: &FileOutcome, show_plan: bool) {
    for env in &outcome.environments {
        environment(ctx, env);
    }
    batch(ctx, &outcome.packages, show_plan);
}

// ============================================================================
// Environments, tool, observation
// ============================================================================

pub fn environment(ctx: &Context, outcome: &EnvironmentOutcome) {
    if outcome.failed {
        ui::error(&outcome.msg);
    } else if outcome.changed {
        ui::success(&outcome.msg);
    } else if !ctx.quiet {
        ui::info(&outcome.msg);
    }
}

pub fn tool(ctx: &Context, outcome: &ToolOutcome) {
    if outcome.changed {
        ui::success(&outcome.msg);
    } else if !ctx.quiet {
        ui::info(&outcome.msg);
    }
}

/// What the package manager reports about one package.
#[derive(Debug, Serialize)]
pub struct Observation {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(flatten)]
    pub state: ObservedState,
}

pub fn observation(obs: &Observation) {
    let title = match &obs.environment {
        Some(env) => format!("{env}:{}", obs.name),
        None => obs.name.clone(),
    };
    ui::header(&title);

    if !obs.state.exists {
        ui::warn("unknown to the package manager");
        return;
    }

    let installed: Vec<String> = obs.state.installed_versions.iter().cloned().collect();
    ui::kv("installed", &ui::list_or_none(&installed));
    ui::kv(
        "active",
        obs.state.active_version.as_deref().unwrap_or("(none)"),
    );
    ui::kv(
        "available",
        obs.state.available_version.as_deref().unwrap_or("(unknown)"),
    );
    if obs.state.exclusive_versions {
        ui::dim("one version per environment");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{PlanningError, ValidationError};

    #[test]
    fn test_failure_report_validation() {
        let err = anyhow::Error::from(converge::Error::from(ValidationError::EmptyName));
        let report = failure_report(&err);
        assert_eq!(report.kind, "validation");
        assert!(!report.changed);
        assert!(report.category.is_none());
    }

    #[test]
    fn test_failure_report_keeps_context() {
        let err = anyhow::Error::from(converge::Error::from(PlanningError::MissingRecipe {
            name: "samtools".into(),
        }))
        .context("Failed to plan samtools");
        let report = failure_report(&err);
        assert_eq!(report.kind, "planning");
        assert!(report.msg.starts_with("Failed to plan samtools: "));
    }

    #[test]
    fn test_failure_report_tool_error() {
        let err = anyhow::Error::from(pkgkit::Error::ToolNotFound {
            tool: pkgkit::Tool::Conda,
        });
        let report = failure_report(&err);
        assert_eq!(report.kind, "tool");
        assert_eq!(report.category, Some(ErrorCategory::ToolNotFound));
    }

    #[test]
    fn test_observation_json_is_flat() {
        let obs = Observation {
            name: "jq".into(),
            environment: None,
            state: ObservedState {
                exists: true,
                active_version: Some("1.7".into()),
                ..ObservedState::default()
            },
        };
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["name"], "jq");
        assert_eq!(json["active_version"], "1.7");
        assert!(json.get("environment").is_none());
    }

    #[test]
    fn test_actions_join() {
        let plan = vec![
            Action::Unlink {
                version: "1.17".into(),
            },
            Action::Link {
                version: "1.18".into(),
            },
        ];
        assert_eq!(actions(&plan), "unlink 1.17, link 1.18");
    }
}
