use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use pkgkit::Tool;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pkgstate")]
#[command(version)]
#[command(about = "Declarative package state for Homebrew and conda", long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Package manager to drive (defaults to the config file, then brew)
    #[arg(short, long, global = true, env = "PKGSTATE_TOOL")]
    pub tool: Option<Tool>,

    /// `:`-separated directories searched for the package manager first
    #[arg(long, global = true, value_name = "DIRS")]
    pub path: Option<String>,

    /// Config file (defaults to config.toml in the config directory)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Coloured, human-readable
    Text,
    /// One JSON document on stdout
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Bring packages to their declared state
    Apply(ApplyArgs),

    /// Show what apply would do without changing anything
    Plan(PlanArgs),

    /// Show what the package manager reports about a package
    Observe(ObserveArgs),

    /// Manage named environments (conda)
    #[command(subcommand)]
    Env(EnvCommand),

    /// Refresh or upgrade through the package manager itself
    #[command(subcommand)]
    Tool(ToolCommand),

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Declarations
// ============================================================================

/// A declaration given on the command line, or a declaration file.
///
/// Several names share one state; `--version` and `--recipe` are given once
/// per name when used.
#[derive(Args, Debug, Default)]
pub struct DeclarationArgs {
    /// Package names
    #[arg(required_unless_present = "file", conflicts_with = "file")]
    pub names: Vec<String>,

    /// Version per package
    #[arg(long = "version", alias = "ver", value_name = "VERSION", conflicts_with = "file")]
    pub versions: Vec<String>,

    /// Recipe (brew formula path/URL, conda channel) per package
    #[arg(long = "recipe", value_name = "RECIPE", conflicts_with = "file")]
    pub recipes: Vec<String>,

    /// Desired state: present, absent, linked, unlinked, head, latest
    #[arg(short, long, default_value = "present")]
    pub state: String,

    /// Environment the packages belong to
    #[arg(short, long = "env", value_name = "NAME", conflicts_with = "file")]
    pub environment: Option<String>,

    /// Declaration file (TOML or JSON)
    #[arg(short, long, value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Parallel jobs for batches
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub declaration: DeclarationArgs,

    /// Plan and report without invoking the package manager
    #[arg(long)]
    pub check: bool,

    /// Refresh the package manager before reconciling
    #[arg(long)]
    pub update: bool,
}

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub declaration: DeclarationArgs,
}

#[derive(Args, Debug)]
pub struct ObserveArgs {
    /// Package name
    pub name: String,

    /// Environment to look in
    #[arg(short, long = "env", value_name = "NAME")]
    pub environment: Option<String>,
}

// ============================================================================
// Environments
// ============================================================================

#[derive(Subcommand)]
pub enum EnvCommand {
    /// Create or remove an environment
    Ensure {
        /// Environment name
        name: String,

        /// Remove the environment instead of creating it
        #[arg(long)]
        absent: bool,

        /// Remove even when packages are still installed in it
        #[arg(long, requires = "absent")]
        force: bool,

        /// Report without changing anything
        #[arg(long)]
        check: bool,
    },

    /// List environments
    List,
}

// ============================================================================
// Package manager
// ============================================================================

#[derive(Subcommand)]
pub enum ToolCommand {
    /// Refresh package definitions (brew update, conda update conda)
    Update {
        /// Report without changing anything
        #[arg(long)]
        check: bool,
    },

    /// Upgrade every installed package
    UpgradeAll {
        /// Report without changing anything
        #[arg(long)]
        check: bool,
    },
}

// ============================================================================
// Config
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the config file location and effective settings
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_apply_single() {
        let cli = Cli::parse_from([
            "pkgstate", "apply", "samtools", "--version", "1.17", "--state", "linked",
        ]);
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.declaration.names, vec!["samtools"]);
                assert_eq!(args.declaration.versions, vec!["1.17"]);
                assert_eq!(args.declaration.state, "linked");
                assert!(!args.check);
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_parse_apply_file_with_global_flags() {
        let cli = Cli::parse_from([
            "pkgstate", "--tool", "conda", "--format", "json", "apply", "--file", "pkgs.toml",
            "--check",
        ]);
        assert_eq!(cli.tool, Some(Tool::Conda));
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Command::Apply(args) => {
                assert!(args.check);
                assert!(args.declaration.names.is_empty());
                assert_eq!(args.declaration.file, Some(PathBuf::from("pkgs.toml")));
            }
            _ => panic!("expected apply"),
        }
    }

    #[test]
    fn test_names_and_file_conflict() {
        assert!(
            Cli::try_parse_from(["pkgstate", "apply", "jq", "--file", "pkgs.toml"]).is_err()
        );
        assert!(Cli::try_parse_from(["pkgstate", "apply"]).is_err());
    }

    #[test]
    fn test_force_requires_absent() {
        assert!(Cli::try_parse_from(["pkgstate", "env", "ensure", "bio", "--force"]).is_err());
        assert!(
            Cli::try_parse_from(["pkgstate", "env", "ensure", "bio", "--absent", "--force"])
                .is_ok()
        );
    }
}
