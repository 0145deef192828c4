use anyhow::{Context as AnyhowContext, Result};
use converge::{EnvironmentSpec, ExecuteOptions, LogProgress, Reconciler};
use pkgkit::Backend;

use crate::Context;
use crate::cli::EnvCommand;
use crate::output;
use crate::ui;

pub fn run(ctx: &Context, cmd: EnvCommand) -> Result<bool> {
    let backend = ctx.backend()?;
    run_with(ctx, backend.as_ref(), cmd)
}

fn run_with(ctx: &Context, backend: &dyn Backend, cmd: EnvCommand) -> Result<bool> {
    match cmd {
        EnvCommand::Ensure {
            name,
            absent,
            force,
            check,
        } => {
            let spec = EnvironmentSpec {
                name,
                exists: !absent,
                force,
            };
            ensure(ctx, backend, &spec, check)
        }
        EnvCommand::List => list(ctx, backend),
    }
}

fn ensure(
    ctx: &Context,
    backend: &dyn Backend,
    spec: &EnvironmentSpec,
    check_mode: bool,
) -> Result<bool> {
    let options = ExecuteOptions {
        check_mode,
        ..Default::default()
    };
    let outcome = Reconciler::new(backend, options)
        .ensure_environment(spec, &mut LogProgress)
        .with_context(|| format!("Failed to ensure environment {}", spec.name))?;

    output::emit(ctx, &outcome, |o| output::environment(ctx, o))?;
    Ok(!outcome.failed)
}

fn list(ctx: &Context, backend: &dyn Backend) -> Result<bool> {
    let environments = backend
        .list_environments()
        .context("Failed to list environments")?;

    output::emit(ctx, &environments, |envs| {
        ui::header("Environments");
        if envs.is_empty() {
            ui::dim("(none)");
        }
        for env in envs {
            println!("  {env}");
        }
    })?;
    Ok(true)
}
