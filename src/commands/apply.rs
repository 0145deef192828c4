//! `apply` and `plan` - bring packages to their declared state
//!
//! Declarations come from the command line (names sharing one state) or
//! from a TOML/JSON declaration file.

use anyhow::{Context as AnyhowContext, Result};
use converge::{
    BatchDeclaration, BatchOutcome, Declaration, DeclarationFile, EnvironmentSpec,
    ExecuteOptions, FileOutcome, LifecycleState, LogProgress, ReconcileOutcome, Reconciler,
    ToolOutcome,
};
use pkgkit::Backend;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::Context;
use crate::cli::{ApplyArgs, DeclarationArgs, OutputFormat, PlanArgs};
use crate::output;
use crate::ui;

/// What `apply` reports, as one document.
#[derive(Debug, Serialize)]
struct ApplyReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_update: Option<ToolOutcome>,
    #[serde(flatten)]
    applied: Applied,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Applied {
    Single(ReconcileOutcome),
    Batch(BatchOutcome),
    File(FileOutcome),
}

impl Applied {
    fn failed(&self) -> bool {
        match self {
            Applied::Single(r) => r.failed,
            Applied::Batch(b) => b.failed,
            Applied::File(f) => f.failed,
        }
    }
}

pub fn apply(ctx: &Context, args: ApplyArgs) -> Result<bool> {
    let backend = ctx.backend()?;
    run_with(
        ctx,
        backend.as_ref(),
        &args.declaration,
        args.check,
        args.update,
    )
}

/// `apply --check` with every planned action listed.
pub fn plan(ctx: &Context, args: PlanArgs) -> Result<bool> {
    let backend = ctx.backend()?;
    run_with(ctx, backend.as_ref(), &args.declaration, true, false)
}

fn run_with(
    ctx: &Context,
    backend: &dyn Backend,
    args: &DeclarationArgs,
    check_mode: bool,
    update_tool: bool,
) -> Result<bool> {
    let options = ExecuteOptions {
        check_mode,
        jobs: ctx.jobs(args.jobs),
    };
    let reconciler = Reconciler::new(backend, options);

    let tool_update = if update_tool {
        Some(
            reconciler
                .update_tool()
                .with_context(|| format!("Failed to update {}", backend.tool()))?,
        )
    } else {
        None
    };

    let applied = match &args.file {
        Some(path) => {
            let file = load_declaration_file(path)?;
            Applied::File(reconciler.apply_file(&file)?)
        }
        None => reconcile_args(&reconciler, args)?,
    };

    let report = ApplyReport {
        tool_update,
        applied,
    };
    let show_plan = check_mode || ctx.verbose > 0;
    output::emit(ctx, &report, |r| render(ctx, r, show_plan))?;
    Ok(!report.applied.failed())
}

/// Reconcile declarations given as command-line arguments.
///
/// With an environment, the environment is ensured first unless the
/// packages are being removed.
fn reconcile_args(reconciler: &Reconciler<'_>, args: &DeclarationArgs) -> Result<Applied> {
    let declarations = declarations_from_args(args)?;

    if let Some(env) = &args.environment {
        let removing = matches!(args.state.parse::<LifecycleState>(), Ok(LifecycleState::Absent));
        if !removing {
            let spec = EnvironmentSpec {
                name: env.clone(),
                exists: true,
                force: false,
            };
            return Ok(Applied::File(
                reconciler.reconcile_in_environment(&spec, &declarations)?,
            ));
        }
    }

    match declarations.as_slice() {
        [single] => Ok(Applied::Single(
            reconciler.reconcile_declaration(single, &mut LogProgress),
        )),
        many => Ok(Applied::Batch(reconciler.reconcile_declarations(many)?)),
    }
}

fn declarations_from_args(args: &DeclarationArgs) -> Result<Vec<Declaration>> {
    let batch = BatchDeclaration {
        names: args.names.clone(),
        versions: (!args.versions.is_empty()).then(|| args.versions.clone()),
        recipes: (!args.recipes.is_empty()).then(|| args.recipes.clone()),
        state: args.state.clone(),
        environment: args.environment.clone(),
    };
    Ok(batch.expand().map_err(converge::Error::from)?)
}

/// Load a declaration file, TOML unless the extension says JSON.
pub fn load_declaration_file(path: &Path) -> Result<DeclarationFile> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read declaration file: {}", path.display()))?;

    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON format in {}", path.display()))
    } else {
        toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))
    }
}

fn render(ctx: &Context, report: &ApplyReport, show_plan: bool) {
    if let Some(update) = &report.tool_update {
        output::tool(ctx, update);
    }
    if show_plan && ctx.format == OutputFormat::Text && !ctx.quiet {
        ui::section("Plan (check mode)");
    }
    match &report.applied {
        Applied::Single(r) => output::result(ctx, r, show_plan),
        Applied::Batch(b) => output::batch(ctx, b, show_plan),
        Applied::File(f) => output::file(ctx, f, show_plan),
    }
}
