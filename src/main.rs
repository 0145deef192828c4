mod cli;
mod commands;
mod config;
mod output;
mod paths;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, OutputFormat};
use config::Config;
use pkgkit::{Backend, Tool};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub format: OutputFormat,
    pub tool: Tool,
    pub path: Option<String>,
    pub config: Config,
}

impl Context {
    /// Locate the package manager and build its backend.
    pub fn backend(&self) -> Result<Box<dyn Backend>> {
        let options = self.config.tool_options(self.tool, self.path.as_deref());
        log::debug!(
            "Using {} with search path {:?}",
            self.tool,
            options.search_path
        );
        Ok(pkgkit::backend::for_tool(self.tool, &options)?)
    }

    /// Parallel jobs: flag, then config file, then 4.
    pub fn jobs(&self, flag: Option<usize>) -> usize {
        flag.or(self.config.jobs).unwrap_or(4).max(1)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let format = cli.format;
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            output::failure(format, &e);
            ExitCode::FAILURE
        }
    }
}

/// Dispatch a command. `Ok(false)` means the command ran but reported a
/// failed outcome.
fn run(cli: Cli) -> Result<bool> {
    if let Command::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "pkgstate", &mut io::stdout());
        return Ok(true);
    }

    let config = Config::load(cli.config.as_deref())?;
    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        format: cli.format,
        tool: cli.tool.or(config.tool).unwrap_or(Tool::Brew),
        path: cli.path,
        config,
    };

    match cli.command {
        Command::Apply(args) => commands::apply::apply(&ctx, args),
        Command::Plan(args) => commands::apply::plan(&ctx, args),
        Command::Observe(args) => commands::observe::run(&ctx, args),
        Command::Env(cmd) => commands::env::run(&ctx, cmd),
        Command::Tool(cmd) => commands::tool::run(&ctx, cmd),
        Command::Config(cmd) => commands::config::run(&ctx, cmd, cli.config.as_deref()),
        Command::Completions { .. } => Ok(true),
    }
}
