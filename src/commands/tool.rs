use anyhow::{Context as AnyhowContext, Result};
use converge::{ExecuteOptions, Reconciler};
use pkgkit::Backend;

use crate::Context;
use crate::cli::ToolCommand;
use crate::output;

pub fn run(ctx: &Context, cmd: ToolCommand) -> Result<bool> {
    let backend = ctx.backend()?;
    run_with(ctx, backend.as_ref(), cmd)
}

fn run_with(ctx: &Context, backend: &dyn Backend, cmd: ToolCommand) -> Result<bool> {
    let (check_mode, upgrade) = match cmd {
        ToolCommand::Update { check } => (check, false),
        ToolCommand::UpgradeAll { check } => (check, true),
    };
    let reconciler = Reconciler::new(
        backend,
        ExecuteOptions {
            check_mode,
            ..Default::default()
        },
    );

    let outcome = if upgrade {
        reconciler
            .upgrade_all()
            .with_context(|| format!("Failed to upgrade {} packages", backend.tool()))?
    } else {
        reconciler
            .update_tool()
            .with_context(|| format!("Failed to update {}", backend.tool()))?
    };

    output::emit(ctx, &outcome, |o| output::tool(ctx, o))?;
    Ok(true)
}
