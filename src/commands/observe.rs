use anyhow::Result;
use converge::{Declaration, Inspector, validate};
use pkgkit::Backend;

use crate::Context;
use crate::cli::ObserveArgs;
use crate::output::{self, Observation};

pub fn run(ctx: &Context, args: ObserveArgs) -> Result<bool> {
    let backend = ctx.backend()?;
    run_with(ctx, backend.as_ref(), args)
}

fn run_with(ctx: &Context, backend: &dyn Backend, args: ObserveArgs) -> Result<bool> {
    let mut declaration = Declaration::new(args.name);
    declaration.environment = args.environment;
    let spec = validate(&declaration).map_err(converge::Error::from)?;

    let state = Inspector::new(backend).observe(spec.identity(), spec.environment())?;
    let observation = Observation {
        name: spec.identity().name().to_string(),
        environment: spec.environment().map(str::to_string),
        state,
    };
    output::emit(ctx, &observation, output::observation)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::OutputFormat;
    use crate::config::Config;
    use pkgkit::{MockBackend, Tool};

    fn ctx() -> Context {
        Context {
            verbose: 0,
            quiet: false,
            format: OutputFormat::Text,
            tool: Tool::Brew,
            path: None,
            config: Config::default(),
        }
    }

    #[test]
    fn test_observe_is_read_only() {
        let mock = MockBackend::new(Tool::Brew)
            .with_installed("samtools", &["1.17", "1.18"])
            .with_linked("samtools", "1.17");
        let args = ObserveArgs {
            name: "samtools".into(),
            environment: None,
        };

        assert!(run_with(&ctx(), &mock, args).unwrap());
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn test_observe_rejects_invalid_name() {
        let mock = MockBackend::new(Tool::Brew);
        let args = ObserveArgs {
            name: "jq; rm -rf /".into(),
            environment: None,
        };
        assert!(run_with(&ctx(), &mock, args).is_err());
    }
}
